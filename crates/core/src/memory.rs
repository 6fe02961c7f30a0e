// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::device::{Device, DeviceHandle};
use crate::monitor::MonitorEngine;
use crate::{AccessType, BenchError, BenchResult, RegionFlags};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type RegionHandle = Arc<MemoryRegion>;

/// A named, contiguous byte buffer owned by one device and exposed at a
/// base address with permission flags. The addressable range is the
/// half-open interval `[base_addr, base_addr + size)`.
pub struct MemoryRegion {
    name: String,
    base_addr: u64,
    size: u64,
    flags: RegionFlags,
    device: Weak<Device>,
    data: Mutex<Vec<u8>>,
}

impl MemoryRegion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_addr(&self) -> u64 {
        self.base_addr
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// The owning device, while it is still alive.
    pub fn device(&self) -> Option<DeviceHandle> {
        self.device.upgrade()
    }

    fn owned_by(&self, device: &DeviceHandle) -> bool {
        self.device
            .upgrade()
            .is_some_and(|d| Arc::ptr_eq(&d, device))
    }

    /// Validates range and permission; returns the buffer offset.
    fn check_access(&self, addr: u64, len: u64, access: AccessType) -> BenchResult<usize> {
        let end = addr
            .checked_add(len)
            .ok_or(BenchError::OutOfRange { addr, size: len })?;
        if addr < self.base_addr || end > self.base_addr + self.size {
            return Err(BenchError::OutOfRange { addr, size: len });
        }
        if !self.flags.allows(access) {
            return Err(BenchError::PermissionDenied { addr });
        }
        Ok((addr - self.base_addr) as usize)
    }

    fn data(&self) -> BenchResult<MutexGuard<'_, Vec<u8>>> {
        self.data.lock().map_err(|_| BenchError::LockPoisoned)
    }
}

impl std::fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("name", &self.name)
            .field("base_addr", &self.base_addr)
            .field("size", &self.size)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Catalog of memory regions and the width-typed access primitives.
///
/// Every successful access emits exactly one monitor notification, after
/// the buffer copy and with no lock held. A dispatch error (from a user
/// action) is propagated to the caller verbatim; by that point the buffer
/// mutation has already happened and is observable.
pub struct MemoryManager {
    monitor: Arc<MonitorEngine>,
    regions: Mutex<Vec<RegionHandle>>,
}

impl MemoryManager {
    pub fn new(monitor: Arc<MonitorEngine>) -> Self {
        Self {
            monitor,
            regions: Mutex::new(Vec::new()),
        }
    }

    fn regions(&self) -> BenchResult<MutexGuard<'_, Vec<RegionHandle>>> {
        self.regions.lock().map_err(|_| BenchError::LockPoisoned)
    }

    /// Creates a region attached to `device`. The buffer is zero-filled.
    /// Region names are unique within the owning device.
    pub fn create_region(
        &self,
        device: &DeviceHandle,
        name: &str,
        base_addr: u64,
        size: u64,
        flags: RegionFlags,
    ) -> BenchResult<RegionHandle> {
        if name.is_empty() || size == 0 {
            return Err(BenchError::InvalidParam);
        }
        if base_addr.checked_add(size).is_none() {
            return Err(BenchError::InvalidParam);
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size as usize)
            .map_err(|_| BenchError::OutOfMemory)?;
        data.resize(size as usize, 0);

        let mut regions = self.regions()?;
        if regions
            .iter()
            .any(|r| r.name == name && r.owned_by(device))
        {
            return Err(BenchError::AlreadyExists(name.to_string()));
        }
        let region = Arc::new(MemoryRegion {
            name: name.to_string(),
            base_addr,
            size,
            flags,
            device: Arc::downgrade(device),
            data: Mutex::new(data),
        });
        regions.push(region.clone());
        drop(regions);

        tracing::debug!(
            "Region '{}/{}' created at {:#x} ({} bytes)",
            device.name(),
            name,
            base_addr,
            size
        );
        Ok(region)
    }

    /// Unlinks the region and removes watchpoints that referenced it.
    pub fn destroy_region(&self, region: &RegionHandle) -> BenchResult<()> {
        {
            let mut regions = self.regions()?;
            let index = regions
                .iter()
                .position(|r| Arc::ptr_eq(r, region))
                .ok_or_else(|| BenchError::RegionNotFound(region.name.clone()))?;
            regions.remove(index);
        }
        self.monitor.purge_region(region);
        tracing::debug!("Region '{}' destroyed", region.name());
        Ok(())
    }

    pub fn find_region(&self, device: &DeviceHandle, name: &str) -> Option<RegionHandle> {
        self.regions()
            .ok()?
            .iter()
            .find(|r| r.name == name && r.owned_by(device))
            .cloned()
    }

    /// All regions owned by `device`, in creation order.
    pub fn regions_of(&self, device: &DeviceHandle) -> Vec<RegionHandle> {
        self.regions()
            .map(|rs| rs.iter().filter(|r| r.owned_by(device)).cloned().collect())
            .unwrap_or_default()
    }

    fn read_scalar(&self, region: &RegionHandle, addr: u64, width: u32) -> BenchResult<u64> {
        if width > 1 && addr % width as u64 != 0 {
            return Err(BenchError::Misaligned { addr, width });
        }
        let offset = region.check_access(addr, width as u64, AccessType::Read)?;
        let value = {
            let data = region.data()?;
            let window = &data[offset..offset + width as usize];
            let mut bytes = [0u8; 8];
            bytes[..window.len()].copy_from_slice(window);
            u64::from_le_bytes(bytes)
        };
        self.monitor
            .notify(region, addr, width as u64, value, AccessType::Read)?;
        Ok(value)
    }

    fn write_scalar(
        &self,
        region: &RegionHandle,
        addr: u64,
        width: u32,
        value: u64,
    ) -> BenchResult<()> {
        if width > 1 && addr % width as u64 != 0 {
            return Err(BenchError::Misaligned { addr, width });
        }
        let offset = region.check_access(addr, width as u64, AccessType::Write)?;
        {
            let mut data = region.data()?;
            let bytes = value.to_le_bytes();
            data[offset..offset + width as usize].copy_from_slice(&bytes[..width as usize]);
        }
        self.monitor
            .notify(region, addr, width as u64, value, AccessType::Write)
    }

    pub fn read_u8(&self, region: &RegionHandle, addr: u64) -> BenchResult<u8> {
        self.read_scalar(region, addr, 1).map(|v| v as u8)
    }

    pub fn read_u16(&self, region: &RegionHandle, addr: u64) -> BenchResult<u16> {
        self.read_scalar(region, addr, 2).map(|v| v as u16)
    }

    pub fn read_u32(&self, region: &RegionHandle, addr: u64) -> BenchResult<u32> {
        self.read_scalar(region, addr, 4).map(|v| v as u32)
    }

    pub fn read_u64(&self, region: &RegionHandle, addr: u64) -> BenchResult<u64> {
        self.read_scalar(region, addr, 8)
    }

    pub fn write_u8(&self, region: &RegionHandle, addr: u64, value: u8) -> BenchResult<()> {
        self.write_scalar(region, addr, 1, value as u64)
    }

    pub fn write_u16(&self, region: &RegionHandle, addr: u64, value: u16) -> BenchResult<()> {
        self.write_scalar(region, addr, 2, value as u64)
    }

    pub fn write_u32(&self, region: &RegionHandle, addr: u64, value: u32) -> BenchResult<()> {
        self.write_scalar(region, addr, 4, value as u64)
    }

    pub fn write_u64(&self, region: &RegionHandle, addr: u64, value: u64) -> BenchResult<()> {
        self.write_scalar(region, addr, 8, value)
    }

    /// Bulk read with no alignment requirement. Emits one aggregate
    /// notification with `value = 0`; bulk transfers are not value-gated.
    pub fn read_buffer(&self, region: &RegionHandle, addr: u64, buf: &mut [u8]) -> BenchResult<()> {
        let offset = region.check_access(addr, buf.len() as u64, AccessType::Read)?;
        {
            let data = region.data()?;
            buf.copy_from_slice(&data[offset..offset + buf.len()]);
        }
        self.monitor
            .notify(region, addr, buf.len() as u64, 0, AccessType::Read)
    }

    /// Bulk write counterpart of [`read_buffer`](Self::read_buffer).
    pub fn write_buffer(&self, region: &RegionHandle, addr: u64, bytes: &[u8]) -> BenchResult<()> {
        let offset = region.check_access(addr, bytes.len() as u64, AccessType::Write)?;
        {
            let mut data = region.data()?;
            data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        self.monitor
            .notify(region, addr, bytes.len() as u64, 0, AccessType::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRegistry;
    use crate::config::BenchConfig;
    use crate::device::DeviceRegistry;
    use crate::{DeviceConfig, DeviceOps};

    struct Stub;
    impl DeviceOps for Stub {}

    fn fixture() -> (DeviceRegistry, MemoryManager, DeviceHandle) {
        let devices = DeviceRegistry::new();
        devices.register_type("stub", Arc::new(Stub), None).unwrap();
        let dev = devices
            .create_device("stub", "dev0", DeviceConfig::default())
            .unwrap();
        let actions = Arc::new(ActionRegistry::new());
        let monitor = Arc::new(MonitorEngine::new(actions, BenchConfig::default()));
        (devices, MemoryManager::new(monitor), dev)
    }

    #[test]
    fn test_create_and_find() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
            .unwrap();
        assert_eq!(region.base_addr(), 0x1000);
        assert_eq!(region.size(), 16);

        let found = memory.find_region(&dev, "regs").unwrap();
        assert!(Arc::ptr_eq(&found, &region));
        assert!(memory.find_region(&dev, "missing").is_none());

        // Name clash within the same device is rejected.
        assert_eq!(
            memory
                .create_region(&dev, "regs", 0x2000, 16, RegionFlags::RW)
                .err(),
            Some(BenchError::AlreadyExists("regs".to_string()))
        );
    }

    #[test]
    fn test_zero_size_rejected() {
        let (_devices, memory, dev) = fixture();
        assert_eq!(
            memory
                .create_region(&dev, "empty", 0x1000, 0, RegionFlags::RW)
                .err(),
            Some(BenchError::InvalidParam)
        );
    }

    #[test]
    fn test_round_trip_all_widths() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 32, RegionFlags::RW)
            .unwrap();

        memory.write_u8(&region, 0x1000, 0xAB).unwrap();
        assert_eq!(memory.read_u8(&region, 0x1000).unwrap(), 0xAB);

        memory.write_u16(&region, 0x1002, 0xBEEF).unwrap();
        assert_eq!(memory.read_u16(&region, 0x1002).unwrap(), 0xBEEF);

        memory.write_u32(&region, 0x1004, 0x1234_5678).unwrap();
        assert_eq!(memory.read_u32(&region, 0x1004).unwrap(), 0x1234_5678);

        memory.write_u64(&region, 0x1008, 0xDEAD_BEEF_CAFE_F00D).unwrap();
        assert_eq!(
            memory.read_u64(&region, 0x1008).unwrap(),
            0xDEAD_BEEF_CAFE_F00D
        );
    }

    #[test]
    fn test_little_endian_encoding() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 8, RegionFlags::RW)
            .unwrap();
        memory.write_u32(&region, 0x1000, 0x1122_3344).unwrap();
        assert_eq!(memory.read_u8(&region, 0x1000).unwrap(), 0x44);
        assert_eq!(memory.read_u8(&region, 0x1003).unwrap(), 0x11);
        assert_eq!(memory.read_u16(&region, 0x1002).unwrap(), 0x1122);
    }

    #[test]
    fn test_alignment_rejected_buffer_untouched() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
            .unwrap();
        assert_eq!(
            memory.write_u32(&region, 0x1001, 1).err(),
            Some(BenchError::Misaligned { addr: 0x1001, width: 4 })
        );
        assert_eq!(
            memory.read_u16(&region, 0x1003).err(),
            Some(BenchError::Misaligned { addr: 0x1003, width: 2 })
        );
        assert_eq!(memory.read_u32(&region, 0x1000).unwrap(), 0);
    }

    #[test]
    fn test_range_rejected() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
            .unwrap();
        assert!(matches!(
            memory.read_u8(&region, 0x0FFF),
            Err(BenchError::OutOfRange { .. })
        ));
        assert!(matches!(
            memory.read_u8(&region, 0x1010),
            Err(BenchError::OutOfRange { .. })
        ));
        // Straddling the end is out of range even though it starts inside.
        assert!(matches!(
            memory.write_u64(&region, 0x1010 - 8 + 4, 0),
            Err(BenchError::Misaligned { .. }) | Err(BenchError::OutOfRange { .. })
        ));
        assert!(matches!(
            memory.read_u64(&region, u64::MAX - 7),
            Err(BenchError::Misaligned { .. }) | Err(BenchError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_permission_rejected() {
        let (_devices, memory, dev) = fixture();
        let ro = memory
            .create_region(&dev, "rom", 0x0, 16, RegionFlags::READ)
            .unwrap();
        assert_eq!(
            memory.write_u8(&ro, 0x0, 1).err(),
            Some(BenchError::PermissionDenied { addr: 0x0 })
        );
        assert_eq!(memory.read_u8(&ro, 0x0).unwrap(), 0);

        let wo = memory
            .create_region(&dev, "mbox", 0x100, 16, RegionFlags::WRITE)
            .unwrap();
        memory.write_u8(&wo, 0x100, 1).unwrap();
        assert_eq!(
            memory.read_u8(&wo, 0x100).err(),
            Some(BenchError::PermissionDenied { addr: 0x100 })
        );
    }

    #[test]
    fn test_buffer_round_trip() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
            .unwrap();
        // Odd offset: buffer transfers have no alignment requirement.
        memory.write_buffer(&region, 0x1001, &[1, 2, 3, 4, 5]).unwrap();
        let mut out = [0u8; 5];
        memory.read_buffer(&region, 0x1001, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5]);

        let mut too_far = [0u8; 8];
        assert!(matches!(
            memory.read_buffer(&region, 0x100A, &mut too_far),
            Err(BenchError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_destroy_region_unlinks() {
        let (_devices, memory, dev) = fixture();
        let region = memory
            .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
            .unwrap();
        memory.destroy_region(&region).unwrap();
        assert!(memory.find_region(&dev, "regs").is_none());
        assert_eq!(
            memory.destroy_region(&region),
            Err(BenchError::RegionNotFound("regs".to_string()))
        );
        // Same name can be created again.
        memory
            .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
            .unwrap();
    }

    #[test]
    fn test_regions_of_device() {
        let (devices, memory, dev) = fixture();
        let other = devices
            .create_device("stub", "dev1", DeviceConfig::default())
            .unwrap();
        memory
            .create_region(&dev, "a", 0x0, 8, RegionFlags::RW)
            .unwrap();
        memory
            .create_region(&dev, "b", 0x100, 8, RegionFlags::RW)
            .unwrap();
        memory
            .create_region(&other, "a", 0x0, 8, RegionFlags::RW)
            .unwrap();

        let owned = memory.regions_of(&dev);
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].name(), "a");
        assert_eq!(owned[1].name(), "b");
        assert_eq!(memory.regions_of(&other).len(), 1);
    }
}
