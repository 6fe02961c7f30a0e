// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Models a temperature sensor as a bench device: a register window for the
//! current reading and limits, a write watchpoint on the reading register,
//! and an alarm rule that fires once the reading crosses a threshold.

use benchwire_core::{
    Bench, BenchError, BenchResult, DeviceConfig, DeviceHandle, DeviceOps, RegionFlags, WatchKind,
};
use std::any::Any;
use std::sync::{Arc, Mutex};

const REG_BASE: u64 = 0x1000;
const REG_CURRENT: u64 = 0x1000;
const REG_MIN: u64 = 0x1004;
const REG_MAX: u64 = 0x1008;
const REG_SIZE: u64 = 16;

const CMD_SET_MAX_TEMP: u32 = 3;
const CMD_ENABLE_ALARM: u32 = 4;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SensorState {
    current_temp: f32,
    min_temp: f32,
    max_temp: f32,
    alarm_enabled: bool,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            current_temp: 25.0,
            min_temp: 0.0,
            max_temp: 100.0,
            alarm_enabled: false,
        }
    }
}

struct TemperatureSensor;

impl TemperatureSensor {
    fn state(device: &DeviceHandle) -> BenchResult<Arc<Mutex<SensorState>>> {
        let data = device
            .user_data()
            .ok_or_else(|| BenchError::DeviceNotFound(device.name().to_string()))?;
        data.downcast::<Mutex<SensorState>>()
            .map_err(|_| BenchError::InvalidParam)
    }
}

impl DeviceOps for TemperatureSensor {
    fn create(&self, device: &DeviceHandle, _config: &DeviceConfig) -> BenchResult<()> {
        device.set_user_data(Some(Arc::new(Mutex::new(SensorState::default()))));
        Ok(())
    }

    fn reset(&self, device: &DeviceHandle) -> BenchResult<()> {
        let state = Self::state(device)?;
        *state.lock().unwrap_or_else(|e| e.into_inner()) = SensorState::default();
        Ok(())
    }

    fn save_state(&self, device: &DeviceHandle) -> BenchResult<Vec<u8>> {
        let state = Self::state(device)?;
        let snapshot = state.lock().unwrap_or_else(|e| e.into_inner()).clone();
        serde_json::to_vec(&snapshot).map_err(|e| BenchError::Io(e.to_string()))
    }

    fn load_state(&self, device: &DeviceHandle, bytes: &[u8]) -> BenchResult<()> {
        let snapshot: SensorState =
            serde_json::from_slice(bytes).map_err(|e| BenchError::Io(e.to_string()))?;
        let state = Self::state(device)?;
        *state.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
        Ok(())
    }

    fn ioctl(&self, device: &DeviceHandle, cmd: u32, arg: &mut (dyn Any + Send)) -> BenchResult<()> {
        let state = Self::state(device)?;
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        match cmd {
            CMD_SET_MAX_TEMP => {
                let limit = arg
                    .downcast_ref::<f32>()
                    .ok_or(BenchError::InvalidParam)?;
                state.max_temp = *limit;
            }
            CMD_ENABLE_ALARM => state.alarm_enabled = true,
            _ => return Err(BenchError::NotSupported),
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let bench = Bench::new();
    bench
        .devices()
        .register_type("temperature_sensor", Arc::new(TemperatureSensor), None)?;

    let sensor = bench.create_device("temperature_sensor", "sensor0", DeviceConfig::default())?;
    let regs = bench
        .memory()
        .create_region(&sensor, "regs", REG_BASE, REG_SIZE, RegionFlags::RW)?;

    // Seed the limit registers with the defaults.
    bench.memory().write_u32(&regs, REG_MIN, 0.0f32.to_bits())?;
    bench.memory().write_u32(&regs, REG_MAX, 100.0f32.to_bits())?;

    // The alarm rule trips once the reading crosses 30 degrees.
    let alarm = bench.actions().create_callback(|ctx| {
        let temp = f32::from_bits(ctx.value as u32);
        println!("ALARM: reading of {:.1} C at {:#x}", temp, ctx.addr);
        Ok(())
    });
    let rule = bench.rules().create("overtemp")?;
    bench
        .rules()
        .set_condition(rule, |ctx| f32::from_bits(ctx.value as u32) > 30.0)?;
    bench.rules().add_action(rule, alarm)?;
    bench.rules().enable(rule)?;

    // Every write to the reading register mirrors the value into the
    // device state and evaluates the alarm rule.
    let bench_in = bench.clone();
    let sensor_in = sensor.clone();
    let on_reading = bench.actions().create_callback(move |ctx| {
        let state = TemperatureSensor::state(&sensor_in)?;
        state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_temp = f32::from_bits(ctx.value as u32);
        match bench_in.rules().find_by_name("overtemp") {
            Some(rule) => bench_in.rules().evaluate(rule, ctx),
            None => Ok(()),
        }
    });
    let wp = bench
        .monitor()
        .add_watchpoint(&regs, REG_CURRENT, 4, WatchKind::Write, 0)?;
    bench.monitor().bind_action(wp, on_reading)?;

    // Tighten the limit and arm the alarm through the device's ioctl.
    let mut new_limit = 40.0f32;
    sensor.ioctl(CMD_SET_MAX_TEMP, &mut new_limit)?;
    sensor.ioctl(CMD_ENABLE_ALARM, &mut ())?;

    // Drive the temperature up in two-degree steps.
    let mut temp = 22.0f32;
    for _ in 0..10 {
        temp += 2.0;
        println!("setting temperature to {:.1} C", temp);
        bench.memory().write_u32(&regs, REG_CURRENT, temp.to_bits())?;
        bench.process_events()?;
    }

    let saved = sensor.save_state()?;
    println!("saved sensor state ({} bytes)", saved.len());

    bench.cleanup()?;
    Ok(())
}
