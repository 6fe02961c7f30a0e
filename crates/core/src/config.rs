// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::UserData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Cap on buffered action dispatches per memory-access notification.
    /// Excess matches are dropped with a diagnostic; the access succeeds.
    pub match_limit: usize,
    /// Cap on the action-id snapshot taken per rule evaluation.
    pub rule_action_limit: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            match_limit: 32,
            rule_action_limit: 32,
        }
    }
}

/// Per-instance configuration passed to the device type's `create` hook.
#[derive(Default, Clone)]
pub struct DeviceConfig {
    /// Opaque payload handed through to the `create` hook.
    pub user_data: Option<UserData>,
    /// Free-form parameters, typically lifted from a bench manifest entry.
    pub params: HashMap<String, serde_json::Value>,
}

impl DeviceConfig {
    /// Convenience lookup for integer parameters.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(|v| v.as_u64())
    }

    /// Convenience lookup for string parameters.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}
