// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default schema version for manifests
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_flags() -> String {
    "rw".to_string()
}

fn default_true() -> bool {
    true
}

/// A declarative description of one bench: the device instances to create,
/// the memory regions to attach, and the watchpoints to install. Actions
/// are code, not data, so manifests never reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    pub r#type: String, // registered device type name
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub regions: Vec<RegionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    pub base: u64,
    pub size: String, // e.g. "16B", "4KB"
    #[serde(default = "default_flags")]
    pub flags: String, // e.g. "rw", "rwx"
    #[serde(default)]
    pub watchpoints: Vec<WatchpointEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchpointEntry {
    pub addr: u64,
    pub size: u32,
    pub kind: String, // "read", "write", "access", "value-write"
    #[serde(default)]
    pub value: Option<u64>, // only meaningful for "value-write"
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl BenchManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;

        let manifest: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON manifest {:?}", path))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML manifest {:?}", path))?
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Manifest 'name' cannot be empty");
        }
        let mut device_names = std::collections::HashSet::new();
        for device in &self.devices {
            if device.name.is_empty() || device.r#type.is_empty() {
                anyhow::bail!("Device entries need both 'name' and 'type'");
            }
            if !device_names.insert(device.name.as_str()) {
                anyhow::bail!("Duplicate device name '{}'", device.name);
            }
            let mut region_names = std::collections::HashSet::new();
            for region in &device.regions {
                if region.name.is_empty() {
                    anyhow::bail!("Region of device '{}' has an empty name", device.name);
                }
                if !region_names.insert(region.name.as_str()) {
                    anyhow::bail!(
                        "Duplicate region name '{}' in device '{}'",
                        region.name,
                        device.name
                    );
                }
                parse_size(&region.size).with_context(|| {
                    format!("Region '{}/{}'", device.name, region.name)
                })?;
                for wp in &region.watchpoints {
                    if wp.size == 0 || wp.size > 8 {
                        anyhow::bail!(
                            "Watchpoint at {:#x} in '{}/{}': size must be 1..=8",
                            wp.addr,
                            device.name,
                            region.name
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
