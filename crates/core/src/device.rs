// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{BenchError, BenchResult, DeviceConfig, DeviceOps, UserData};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type DeviceHandle = Arc<Device>;

/// A named instance of a registered device type.
pub struct Device {
    name: String,
    type_name: String,
    ops: Arc<dyn DeviceOps>,
    type_user_data: Option<UserData>,
    user_data: Mutex<Option<UserData>>,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Opaque payload attached at type registration.
    pub fn type_user_data(&self) -> Option<UserData> {
        self.type_user_data.clone()
    }

    pub fn user_data(&self) -> Option<UserData> {
        self.user_data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_user_data(&self, data: Option<UserData>) {
        *self.user_data.lock().unwrap_or_else(|e| e.into_inner()) = data;
    }

    pub fn reset(self: &Arc<Self>) -> BenchResult<()> {
        self.ops.reset(self)
    }

    pub fn save_state(self: &Arc<Self>) -> BenchResult<Vec<u8>> {
        self.ops.save_state(self)
    }

    pub fn load_state(self: &Arc<Self>, state: &[u8]) -> BenchResult<()> {
        self.ops.load_state(self, state)
    }

    pub fn ioctl(self: &Arc<Self>, cmd: u32, arg: &mut (dyn Any + Send)) -> BenchResult<()> {
        self.ops.ioctl(self, cmd, arg)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

struct DeviceType {
    ops: Arc<dyn DeviceOps>,
    user_data: Option<UserData>,
}

#[derive(Default)]
struct RegistryState {
    types: HashMap<String, DeviceType>,
    devices: HashMap<String, DeviceHandle>,
}

/// Catalog of device types and their live instances.
#[derive(Default)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> BenchResult<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(|_| BenchError::LockPoisoned)
    }

    /// Registers a device type under a unique name.
    pub fn register_type(
        &self,
        type_name: &str,
        ops: Arc<dyn DeviceOps>,
        user_data: Option<UserData>,
    ) -> BenchResult<()> {
        if type_name.is_empty() {
            return Err(BenchError::InvalidParam);
        }
        let mut state = self.state()?;
        if state.types.contains_key(type_name) {
            return Err(BenchError::AlreadyExists(type_name.to_string()));
        }
        state
            .types
            .insert(type_name.to_string(), DeviceType { ops, user_data });
        Ok(())
    }

    /// Removes a device type. Refused with `Busy` while instances of the
    /// type are still alive.
    pub fn unregister_type(&self, type_name: &str) -> BenchResult<()> {
        let mut state = self.state()?;
        if !state.types.contains_key(type_name) {
            return Err(BenchError::DeviceTypeNotFound(type_name.to_string()));
        }
        if state.devices.values().any(|d| d.type_name == type_name) {
            return Err(BenchError::Busy(type_name.to_string()));
        }
        state.types.remove(type_name);
        Ok(())
    }

    /// Creates a device instance. The instance name is reserved under the
    /// registry lock, then the type's `create` hook runs unlocked; if the
    /// hook fails the reservation is rolled back and no device exists.
    pub fn create_device(
        &self,
        type_name: &str,
        name: &str,
        config: DeviceConfig,
    ) -> BenchResult<DeviceHandle> {
        if type_name.is_empty() || name.is_empty() {
            return Err(BenchError::InvalidParam);
        }

        let device = {
            let mut state = self.state()?;
            if state.devices.contains_key(name) {
                return Err(BenchError::AlreadyExists(name.to_string()));
            }
            let ty = state
                .types
                .get(type_name)
                .ok_or_else(|| BenchError::DeviceTypeNotFound(type_name.to_string()))?;
            let device = Arc::new(Device {
                name: name.to_string(),
                type_name: type_name.to_string(),
                ops: ty.ops.clone(),
                type_user_data: ty.user_data.clone(),
                user_data: Mutex::new(None),
            });
            state.devices.insert(name.to_string(), device.clone());
            device
        };

        if let Err(err) = device.ops.create(&device, &config) {
            if let Ok(mut state) = self.state() {
                state.devices.remove(name);
            }
            tracing::debug!("Create hook of device '{}' failed: {}", name, err);
            return Err(err);
        }

        tracing::debug!("Device '{}' of type '{}' created", name, type_name);
        Ok(device)
    }

    /// Unlinks the device and invokes its type's `destroy` hook. Owned
    /// regions must already be gone; `Bench::destroy_device` cascades them.
    pub(crate) fn remove_device(&self, device: &DeviceHandle) -> BenchResult<()> {
        {
            let mut state = self.state()?;
            match state.devices.get(device.name()) {
                Some(current) if Arc::ptr_eq(current, device) => {
                    state.devices.remove(device.name());
                }
                _ => return Err(BenchError::DeviceNotFound(device.name().to_string())),
            }
        }
        device.ops.destroy(device);
        tracing::debug!("Device '{}' destroyed", device.name());
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<DeviceHandle> {
        self.state().ok()?.devices.get(name).cloned()
    }

    /// All live devices, in no particular order.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.state()
            .map(|s| s.devices.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear_types(&self) {
        if let Ok(mut state) = self.state() {
            state.types.clear();
        }
    }
}
