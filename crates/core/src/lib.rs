// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod action;
pub mod bench;
pub mod config;
pub mod device;
pub mod memory;
pub mod monitor;
pub mod rule;

pub use action::{ActionId, ActionRegistry, ActionType};
pub use bench::Bench;
pub use config::{BenchConfig, DeviceConfig};
pub use device::{Device, DeviceHandle, DeviceRegistry};
pub use memory::{MemoryManager, MemoryRegion, RegionHandle};
pub use monitor::{MonitorContext, MonitorEngine, WatchKind, WatchpointId, WatchpointInfo};
pub use rule::{RuleEngine, RuleId};

use std::any::Any;
use std::ops::BitOr;
use std::str::FromStr;
use std::sync::Arc;


pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Opaque user payload attached to devices, device types, actions, and
/// rules. Shared, because callbacks may retain it on any thread.
pub type UserData = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BenchError {
    #[error("invalid parameter")]
    InvalidParam,
    #[error("out of memory")]
    OutOfMemory,
    #[error("not found")]
    NotFound,
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("operation not supported")]
    NotSupported,
    #[error("'{0}' is busy")]
    Busy(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("lock poisoned")]
    LockPoisoned,

    #[error("device type '{0}' not found")]
    DeviceTypeNotFound(String),
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("memory region '{0}' not found")]
    RegionNotFound(String),
    #[error("memory access out of range at {addr:#x} ({size} bytes)")]
    OutOfRange { addr: u64, size: u64 },
    #[error("memory permission denied at {addr:#x}")]
    PermissionDenied { addr: u64 },
    #[error("misaligned {width}-byte access at {addr:#x}")]
    Misaligned { addr: u64, width: u32 },

    #[error("watchpoint {0} not found")]
    WatchpointNotFound(WatchpointId),

    #[error("action {0} not found")]
    ActionNotFound(ActionId),
    #[error("action {id} execution failed (exit status {status:?})")]
    ActionExecuteFailed { id: ActionId, status: Option<i32> },

    #[error("rule {0} not found")]
    RuleNotFound(RuleId),
    #[error("rule action failed: {0}")]
    RuleActionFailed(Box<BenchError>),
}

impl BenchError {
    /// Stable numeric code, grouped in per-component bands. Kept for hosts
    /// that report status as an integer rather than through `Display`.
    pub fn code(&self) -> i32 {
        match self {
            BenchError::InvalidParam => -1,
            BenchError::OutOfMemory => -2,
            BenchError::NotFound => -3,
            BenchError::AlreadyExists(_) => -4,
            BenchError::NotSupported => -5,
            BenchError::Busy(_) => -8,
            BenchError::Io(_) => -9,
            BenchError::LockPoisoned => -13,
            BenchError::DeviceTypeNotFound(_) => -100,
            BenchError::DeviceNotFound(_) => -101,
            BenchError::RegionNotFound(_) => -200,
            BenchError::OutOfRange { .. } => -201,
            BenchError::PermissionDenied { .. } => -202,
            BenchError::Misaligned { .. } => -203,
            BenchError::WatchpointNotFound(_) => -300,
            BenchError::ActionNotFound(_) => -400,
            BenchError::ActionExecuteFailed { .. } => -401,
            BenchError::RuleNotFound(_) => -500,
            BenchError::RuleActionFailed(_) => -502,
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;

/// The dimension along which watchpoints filter memory accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
    Exec,
}

impl AccessType {
    /// Integer encoding handed to script actions as a positional argument.
    pub fn as_u32(self) -> u32 {
        match self {
            AccessType::Read => 0,
            AccessType::Write => 1,
            AccessType::Exec => 2,
        }
    }
}

/// Access-permission bits of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionFlags(u32);

impl RegionFlags {
    pub const READ: RegionFlags = RegionFlags(1 << 0);
    pub const WRITE: RegionFlags = RegionFlags(1 << 1);
    pub const EXEC: RegionFlags = RegionFlags(1 << 2);
    pub const RW: RegionFlags = RegionFlags(Self::READ.0 | Self::WRITE.0);
    pub const RX: RegionFlags = RegionFlags(Self::READ.0 | Self::EXEC.0);
    pub const RWX: RegionFlags = RegionFlags(Self::READ.0 | Self::WRITE.0 | Self::EXEC.0);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: RegionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn allows(self, access: AccessType) -> bool {
        let required = match access {
            AccessType::Read => Self::READ,
            AccessType::Write => Self::WRITE,
            AccessType::Exec => Self::EXEC,
        };
        self.contains(required)
    }
}

impl BitOr for RegionFlags {
    type Output = RegionFlags;

    fn bitor(self, rhs: RegionFlags) -> RegionFlags {
        RegionFlags(self.0 | rhs.0)
    }
}

impl FromStr for RegionFlags {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        if v.is_empty() {
            return Err("empty region flags".to_string());
        }
        let mut flags = RegionFlags(0);
        for c in v.chars() {
            flags = flags
                | match c {
                    'r' => Self::READ,
                    'w' => Self::WRITE,
                    'x' => Self::EXEC,
                    _ => {
                        return Err(format!(
                            "unsupported region flag '{}' in '{}'; supported: r, w, x",
                            c, value
                        ))
                    }
                };
        }
        Ok(flags)
    }
}

/// Behavioral hooks of a device type.
///
/// A defaulted method is an empty vtable slot: `reset`, `save_state`,
/// `load_state`, and `ioctl` report `NotSupported` unless overridden. All
/// hooks are invoked with no core lock held and may call back into any part
/// of the bench.
pub trait DeviceOps: Send + Sync {
    /// Invoked while the device is being created. Returning an error aborts
    /// the creation and the partially-built device is released.
    fn create(&self, device: &DeviceHandle, config: &DeviceConfig) -> BenchResult<()> {
        let _ = (device, config);
        Ok(())
    }

    /// Invoked after the device has been removed from the registry.
    fn destroy(&self, device: &DeviceHandle) {
        let _ = device;
    }

    fn reset(&self, device: &DeviceHandle) -> BenchResult<()> {
        let _ = device;
        Err(BenchError::NotSupported)
    }

    fn save_state(&self, device: &DeviceHandle) -> BenchResult<Vec<u8>> {
        let _ = device;
        Err(BenchError::NotSupported)
    }

    fn load_state(&self, device: &DeviceHandle, state: &[u8]) -> BenchResult<()> {
        let _ = (device, state);
        Err(BenchError::NotSupported)
    }

    fn ioctl(&self, device: &DeviceHandle, cmd: u32, arg: &mut (dyn Any + Send)) -> BenchResult<()> {
        let _ = (device, cmd, arg);
        Err(BenchError::NotSupported)
    }
}
