// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use benchwire_core::{Bench, DeviceConfig, DeviceOps, RegionFlags, RegionHandle};
use proptest::prelude::*;
use std::sync::Arc;

struct Stub;
impl DeviceOps for Stub {}

const REGION_BASE: u64 = 0x4000_0000;
const REGION_SIZE: u64 = 256;

fn region() -> (Bench, RegionHandle) {
    let bench = Bench::new();
    bench
        .devices()
        .register_type("stub", Arc::new(Stub), None)
        .unwrap();
    let dev = bench
        .create_device("stub", "dev", DeviceConfig::default())
        .unwrap();
    let region = bench
        .memory()
        .create_region(&dev, "ram", REGION_BASE, REGION_SIZE, RegionFlags::RW)
        .unwrap();
    (bench, region)
}

proptest! {
    // After a successful write of any width, reading the same width at the
    // same address returns the written value.
    #[test]
    fn prop_write_read_round_trip(
        offset in 0u64..REGION_SIZE / 8,
        value in any::<u64>(),
        width in prop::sample::select(vec![1u32, 2, 4, 8]),
    ) {
        let (bench, region) = region();
        let addr = REGION_BASE + offset * 8; // aligned for every width
        let memory = bench.memory();
        match width {
            1 => {
                memory.write_u8(&region, addr, value as u8).unwrap();
                prop_assert_eq!(memory.read_u8(&region, addr).unwrap(), value as u8);
            }
            2 => {
                memory.write_u16(&region, addr, value as u16).unwrap();
                prop_assert_eq!(memory.read_u16(&region, addr).unwrap(), value as u16);
            }
            4 => {
                memory.write_u32(&region, addr, value as u32).unwrap();
                prop_assert_eq!(memory.read_u32(&region, addr).unwrap(), value as u32);
            }
            _ => {
                memory.write_u64(&region, addr, value).unwrap();
                prop_assert_eq!(memory.read_u64(&region, addr).unwrap(), value);
            }
        }
    }

    // Wide accesses succeed exactly when the address is width-aligned and
    // the window fits in the region.
    #[test]
    fn prop_alignment_law(
        offset in 0u64..REGION_SIZE + 16,
        width in prop::sample::select(vec![2u32, 4, 8]),
    ) {
        let (bench, region) = region();
        let addr = REGION_BASE + offset;
        let result = match width {
            2 => bench.memory().write_u16(&region, addr, 1).map(|_| ()),
            4 => bench.memory().write_u32(&region, addr, 1).map(|_| ()),
            _ => bench.memory().write_u64(&region, addr, 1).map(|_| ()),
        };
        let aligned = addr % width as u64 == 0;
        let in_range = offset + width as u64 <= REGION_SIZE;
        prop_assert_eq!(result.is_ok(), aligned && in_range);
    }

    // A rejected access never changes the buffer.
    #[test]
    fn prop_rejected_write_leaves_buffer_intact(
        offset in 0u64..REGION_SIZE + 16,
        value in any::<u64>(),
    ) {
        let (bench, region) = region();
        let mut before = vec![0u8; REGION_SIZE as usize];
        bench
            .memory()
            .read_buffer(&region, REGION_BASE, &mut before)
            .unwrap();

        let addr = REGION_BASE + offset;
        if bench.memory().write_u64(&region, addr, value).is_err() {
            let mut after = vec![0u8; REGION_SIZE as usize];
            bench
                .memory()
                .read_buffer(&region, REGION_BASE, &mut after)
                .unwrap();
            prop_assert_eq!(before, after);
        }
    }

    // Narrow writes only touch their own window.
    #[test]
    fn prop_writes_are_width_local(
        offset in 1u64..REGION_SIZE / 8 - 1,
        value in any::<u32>(),
    ) {
        let (bench, region) = region();
        let addr = REGION_BASE + offset * 8;
        bench.memory().write_u64(&region, addr - 8, u64::MAX).unwrap();
        bench.memory().write_u64(&region, addr + 8, u64::MAX).unwrap();

        bench.memory().write_u32(&region, addr, value).unwrap();

        prop_assert_eq!(bench.memory().read_u64(&region, addr - 8).unwrap(), u64::MAX);
        prop_assert_eq!(bench.memory().read_u64(&region, addr + 8).unwrap(), u64::MAX);
        prop_assert_eq!(bench.memory().read_u32(&region, addr).unwrap(), value);
        // The upper half of the aligned u64 window stays zero.
        prop_assert_eq!(bench.memory().read_u32(&region, addr + 4).unwrap(), 0);
    }
}
