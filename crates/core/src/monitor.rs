// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::action::{ActionId, ActionRegistry};
use crate::config::BenchConfig;
use crate::memory::{MemoryRegion, RegionHandle};
use crate::{AccessType, BenchError, BenchResult};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type WatchpointId = u32;

/// What kind of accesses a watchpoint fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Read,
    Write,
    /// Read or write.
    Access,
    /// Write of one specific value (compared zero-extended to 64 bits).
    ValueWrite,
}

impl FromStr for WatchKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "read" | "r" => Ok(Self::Read),
            "write" | "w" => Ok(Self::Write),
            "access" | "rw" => Ok(Self::Access),
            "value-write" | "value_write" => Ok(Self::ValueWrite),
            _ => Err(format!(
                "unsupported watchpoint kind '{}'; supported: read, write, access, value-write",
                value
            )),
        }
    }
}

/// Transient description of one memory access, handed by reference to
/// predicates and actions. Never retained across calls by the core.
#[derive(Clone)]
pub struct MonitorContext {
    pub region: RegionHandle,
    pub addr: u64,
    pub size: u64,
    pub value: u64,
    pub access: AccessType,
}

#[derive(Clone)]
pub struct WatchpointInfo {
    /// `None` once the watched region has been destroyed.
    pub region: Option<RegionHandle>,
    pub addr: u64,
    pub size: u32,
    pub kind: WatchKind,
    pub enabled: bool,
}

struct Watchpoint {
    id: WatchpointId,
    region: Weak<MemoryRegion>,
    addr: u64,
    size: u32,
    kind: WatchKind,
    wpvalue: u64,
    enabled: bool,
    action_ids: Vec<ActionId>,
}

impl Watchpoint {
    fn matches(&self, region: &RegionHandle, addr: u64, size: u64, value: u64, access: AccessType) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(watched) = self.region.upgrade() else {
            return false;
        };
        if !Arc::ptr_eq(&watched, region) {
            return false;
        }
        // Any overlap of [addr, addr+size) with the watched window matches;
        // containment is not required.
        let wp_end = self.addr.saturating_add(self.size as u64);
        if addr.saturating_add(size) <= self.addr || addr >= wp_end {
            return false;
        }
        match self.kind {
            WatchKind::Read => access == AccessType::Read,
            WatchKind::Write => access == AccessType::Write,
            WatchKind::Access => matches!(access, AccessType::Read | AccessType::Write),
            WatchKind::ValueWrite => access == AccessType::Write && value == self.wpvalue,
        }
    }
}

/// Watchpoint registry and the dispatcher that fans memory accesses out to
/// bound actions.
pub struct MonitorEngine {
    actions: Arc<ActionRegistry>,
    watchpoints: Mutex<Vec<Watchpoint>>,
    next_id: AtomicU32,
    match_limit: usize,
}

impl MonitorEngine {
    pub fn new(actions: Arc<ActionRegistry>, config: BenchConfig) -> Self {
        Self {
            actions,
            watchpoints: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            match_limit: config.match_limit,
        }
    }

    fn watchpoints(&self) -> BenchResult<MutexGuard<'_, Vec<Watchpoint>>> {
        self.watchpoints.lock().map_err(|_| BenchError::LockPoisoned)
    }

    /// Installs a watchpoint over `size` bytes (1..=8) at `addr`. Enabled
    /// from the start. `wpvalue` is only meaningful for `ValueWrite`.
    pub fn add_watchpoint(
        &self,
        region: &RegionHandle,
        addr: u64,
        size: u32,
        kind: WatchKind,
        wpvalue: u64,
    ) -> BenchResult<WatchpointId> {
        if size == 0 || size > 8 {
            return Err(BenchError::InvalidParam);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.watchpoints()?.push(Watchpoint {
            id,
            region: Arc::downgrade(region),
            addr,
            size,
            kind,
            wpvalue,
            enabled: true,
            action_ids: Vec::new(),
        });
        tracing::debug!(
            "Watchpoint {} ({:?}) added over '{}' at {:#x}+{}",
            id,
            kind,
            region.name(),
            addr,
            size
        );
        Ok(id)
    }

    pub fn remove_watchpoint(&self, id: WatchpointId) -> BenchResult<()> {
        let mut wps = self.watchpoints()?;
        let index = wps
            .iter()
            .position(|wp| wp.id == id)
            .ok_or(BenchError::WatchpointNotFound(id))?;
        wps.remove(index);
        Ok(())
    }

    pub fn enable_watchpoint(&self, id: WatchpointId) -> BenchResult<()> {
        self.set_enabled(id, true)
    }

    pub fn disable_watchpoint(&self, id: WatchpointId) -> BenchResult<()> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: WatchpointId, enabled: bool) -> BenchResult<()> {
        let mut wps = self.watchpoints()?;
        let wp = wps
            .iter_mut()
            .find(|wp| wp.id == id)
            .ok_or(BenchError::WatchpointNotFound(id))?;
        wp.enabled = enabled;
        Ok(())
    }

    /// Binds an action; rebinding an already-bound action is a no-op.
    pub fn bind_action(&self, id: WatchpointId, action_id: ActionId) -> BenchResult<()> {
        let mut wps = self.watchpoints()?;
        let wp = wps
            .iter_mut()
            .find(|wp| wp.id == id)
            .ok_or(BenchError::WatchpointNotFound(id))?;
        if !wp.action_ids.contains(&action_id) {
            wp.action_ids.push(action_id);
        }
        Ok(())
    }

    pub fn unbind_action(&self, id: WatchpointId, action_id: ActionId) -> BenchResult<()> {
        let mut wps = self.watchpoints()?;
        let wp = wps
            .iter_mut()
            .find(|wp| wp.id == id)
            .ok_or(BenchError::WatchpointNotFound(id))?;
        let index = wp
            .action_ids
            .iter()
            .position(|&a| a == action_id)
            .ok_or(BenchError::NotFound)?;
        wp.action_ids.remove(index);
        Ok(())
    }

    pub fn get_info(&self, id: WatchpointId) -> BenchResult<WatchpointInfo> {
        let wps = self.watchpoints()?;
        let wp = wps
            .iter()
            .find(|wp| wp.id == id)
            .ok_or(BenchError::WatchpointNotFound(id))?;
        Ok(WatchpointInfo {
            region: wp.region.upgrade(),
            addr: wp.addr,
            size: wp.size,
            kind: wp.kind,
            enabled: wp.enabled,
        })
    }

    /// Ids of all watchpoints installed over `region`, in insertion order.
    pub fn find_watchpoints(&self, region: &RegionHandle) -> Vec<WatchpointId> {
        self.watchpoints()
            .map(|wps| {
                wps.iter()
                    .filter(|wp| {
                        wp.region
                            .upgrade()
                            .is_some_and(|r| Arc::ptr_eq(&r, region))
                    })
                    .map(|wp| wp.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops every watchpoint that referenced `region` (or whose region is
    /// already gone). Called when a region is destroyed.
    pub(crate) fn purge_region(&self, region: &RegionHandle) {
        if let Ok(mut wps) = self.watchpoints() {
            let before = wps.len();
            wps.retain(|wp| {
                wp.region
                    .upgrade()
                    .is_some_and(|r| !Arc::ptr_eq(&r, region))
            });
            let removed = before - wps.len();
            if removed > 0 {
                tracing::debug!("Purged {} watchpoint(s) of region '{}'", removed, region.name());
            }
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut wps) = self.watchpoints() {
            wps.clear();
        }
    }

    /// Called by the memory manager on every successful access.
    ///
    /// Two-phase by construction: the matching set is computed under the
    /// engine lock, then the lock is released and the buffered actions run.
    /// Actions may therefore write memory and re-enter this engine freely.
    /// Matching is done against the pre-dispatch watchpoint set; actions
    /// adding or removing watchpoints do not affect the ongoing dispatch.
    ///
    /// Every buffered action is attempted even if an earlier one fails; the
    /// first error is returned once the fan-out is complete.
    pub fn notify(
        &self,
        region: &RegionHandle,
        addr: u64,
        size: u64,
        value: u64,
        access: AccessType,
    ) -> BenchResult<()> {
        let mut pending: Vec<ActionId> = Vec::new();
        let mut truncated = false;
        {
            let wps = self.watchpoints()?;
            'scan: for wp in wps.iter() {
                if !wp.matches(region, addr, size, value, access) {
                    continue;
                }
                for &action_id in &wp.action_ids {
                    if pending.len() >= self.match_limit {
                        truncated = true;
                        break 'scan;
                    }
                    pending.push(action_id);
                }
            }
        }
        if truncated {
            tracing::warn!(
                "Match limit {} reached for access at {:#x}; dropping remaining watchpoint actions",
                self.match_limit,
                addr
            );
        }
        if pending.is_empty() {
            return Ok(());
        }

        let context = MonitorContext {
            region: region.clone(),
            addr,
            size,
            value,
            access,
        };
        let mut first_err: Option<BenchError> = None;
        for action_id in pending {
            if let Err(err) = self.actions.execute(action_id, &context) {
                tracing::warn!("Watchpoint action {} failed: {}", action_id, err);
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
