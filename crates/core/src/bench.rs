// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::action::ActionRegistry;
use crate::device::{DeviceHandle, DeviceRegistry};
use crate::memory::MemoryManager;
use crate::monitor::{MonitorEngine, WatchKind};
use crate::rule::RuleEngine;
use crate::{BenchConfig, BenchError, BenchResult, DeviceConfig, RegionFlags};
use benchwire_config::{parse_size, BenchManifest};
use std::sync::Arc;

/// The owning container for one simulated bench of devices.
///
/// A `Bench` replaces process-wide registries: tests and embedders can run
/// any number of isolated instances, and teardown is deterministic. It is
/// cheap to clone and every entry point takes `&self`, so callbacks close
/// over a clone to reach back into the system they run under.
#[derive(Clone)]
pub struct Bench {
    devices: Arc<DeviceRegistry>,
    memory: Arc<MemoryManager>,
    monitor: Arc<MonitorEngine>,
    actions: Arc<ActionRegistry>,
    rules: Arc<RuleEngine>,
}

impl Default for Bench {
    fn default() -> Self {
        Self::new()
    }
}

impl Bench {
    pub fn new() -> Self {
        Self::with_config(BenchConfig::default())
    }

    /// Wires the components in dependency order, leaves first.
    pub fn with_config(config: BenchConfig) -> Self {
        let actions = Arc::new(ActionRegistry::new());
        let monitor = Arc::new(MonitorEngine::new(actions.clone(), config.clone()));
        let memory = Arc::new(MemoryManager::new(monitor.clone()));
        let rules = Arc::new(RuleEngine::new(actions.clone(), config));
        let devices = Arc::new(DeviceRegistry::new());
        Self {
            devices,
            memory,
            monitor,
            actions,
            rules,
        }
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn monitor(&self) -> &MonitorEngine {
        &self.monitor
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn create_device(
        &self,
        type_name: &str,
        name: &str,
        config: DeviceConfig,
    ) -> BenchResult<DeviceHandle> {
        self.devices.create_device(type_name, name, config)
    }

    /// Destroys a device and everything hanging off it: every owned region
    /// is destroyed first (removing watchpoints installed over it), then
    /// the device is unlinked and its type's `destroy` hook runs.
    pub fn destroy_device(&self, device: &DeviceHandle) -> BenchResult<()> {
        for region in self.memory.regions_of(device) {
            self.memory.destroy_region(&region)?;
        }
        self.devices.remove_device(device)
    }

    /// Reserved for a future asynchronous dispatch mode. All dispatch is
    /// currently synchronous within the originating access, so this returns
    /// success and performs no work.
    pub fn process_events(&self) -> BenchResult<()> {
        Ok(())
    }

    /// Tears everything down in dependency order: rules, watchpoints,
    /// actions, then devices (running `destroy` hooks and cascading their
    /// regions) and finally device types. Safe to call repeatedly; the
    /// bench stays usable afterwards.
    pub fn cleanup(&self) -> BenchResult<()> {
        self.rules.clear();
        self.monitor.clear();
        self.actions.clear();
        for device in self.devices.devices() {
            self.destroy_device(&device)?;
        }
        self.devices.clear_types();
        tracing::debug!("Bench cleaned up");
        Ok(())
    }

    pub fn version() -> (u32, u32, u32) {
        (
            crate::VERSION_MAJOR,
            crate::VERSION_MINOR,
            crate::VERSION_PATCH,
        )
    }

    /// Instantiates the devices, regions, and watchpoints a manifest
    /// declares. The referenced device types must already be registered.
    /// Manifest watchpoints carry no actions - actions are code; bind them
    /// afterwards via [`MonitorEngine::find_watchpoints`].
    pub fn apply_manifest(&self, manifest: &BenchManifest) -> BenchResult<()> {
        for entry in &manifest.devices {
            let config = DeviceConfig {
                user_data: None,
                params: entry.config.clone(),
            };
            let device = self.devices.create_device(&entry.r#type, &entry.name, config)?;

            for region_entry in &entry.regions {
                let size = parse_size(&region_entry.size).map_err(|err| {
                    tracing::warn!("Bad size for manifest region '{}': {}", region_entry.name, err);
                    BenchError::InvalidParam
                })?;
                let flags: RegionFlags = region_entry.flags.parse().map_err(|err: String| {
                    tracing::warn!("Bad flags for manifest region '{}': {}", region_entry.name, err);
                    BenchError::InvalidParam
                })?;
                let region = self.memory.create_region(
                    &device,
                    &region_entry.name,
                    region_entry.base,
                    size,
                    flags,
                )?;

                for wp in &region_entry.watchpoints {
                    let kind: WatchKind = wp.kind.parse().map_err(|err: String| {
                        tracing::warn!(
                            "Bad watchpoint kind in manifest region '{}': {}",
                            region_entry.name,
                            err
                        );
                        BenchError::InvalidParam
                    })?;
                    let id = self.monitor.add_watchpoint(
                        &region,
                        wp.addr,
                        wp.size,
                        kind,
                        wp.value.unwrap_or(0),
                    )?;
                    if !wp.enabled {
                        self.monitor.disable_watchpoint(id)?;
                    }
                }
            }
        }
        tracing::debug!("Manifest '{}' applied", manifest.name);
        Ok(())
    }
}
