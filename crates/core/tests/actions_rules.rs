// BenchWire - Virtual Device Bench
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use benchwire_core::{Bench, BenchError, DeviceConfig, DeviceOps, RegionFlags, WatchKind};
use std::io::Write;
use std::sync::Arc;

struct Stub;
impl DeviceOps for Stub {}

struct Fixture {
    bench: Bench,
    region: benchwire_core::RegionHandle,
}

fn fixture() -> Fixture {
    let bench = Bench::new();
    bench
        .devices()
        .register_type("stub", Arc::new(Stub), None)
        .unwrap();
    let dev = bench
        .create_device("stub", "d0", DeviceConfig::default())
        .unwrap();
    let region = bench
        .memory()
        .create_region(&dev, "regs", 0x1000, 16, RegionFlags::RW)
        .unwrap();
    Fixture { bench, region }
}

#[cfg(unix)]
fn write_executable(path: &std::path::Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

#[cfg(unix)]
#[test]
fn script_action_receives_access_arguments() {
    let f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("access.log");
    let script_path = dir.path().join("log_access.sh");
    write_executable(
        &script_path,
        &format!("#!/bin/sh\necho \"$1 $2 $3 $4\" >> {}\n", out_path.display()),
    );

    let action = f.bench.actions().create_script(&script_path).unwrap();
    let wp = f
        .bench
        .monitor()
        .add_watchpoint(&f.region, 0x1000, 4, WatchKind::Write, 0)
        .unwrap();
    f.bench.monitor().bind_action(wp, action).unwrap();

    f.bench.memory().write_u32(&f.region, 0x1000, 77).unwrap();

    // addr size value access, decimal; access 1 = write.
    let log = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(log.trim(), format!("{} 4 77 1", 0x1000u64));
}

#[cfg(unix)]
#[test]
fn failing_script_surfaces_exit_status() {
    let f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("fail.sh");
    write_executable(&script_path, "#!/bin/sh\nexit 2\n");

    let action = f.bench.actions().create_script(&script_path).unwrap();
    let wp = f
        .bench
        .monitor()
        .add_watchpoint(&f.region, 0x1000, 4, WatchKind::Write, 0)
        .unwrap();
    f.bench.monitor().bind_action(wp, action).unwrap();

    // The write lands, then the dispatch error propagates.
    assert_eq!(
        f.bench.memory().write_u32(&f.region, 0x1000, 1).err(),
        Some(BenchError::ActionExecuteFailed {
            id: action,
            status: Some(2)
        })
    );
    assert_eq!(f.bench.memory().read_u32(&f.region, 0x1000).unwrap(), 1);
}

#[cfg(unix)]
#[test]
fn command_action_runs_through_shell() {
    let f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("fired");

    let action = f
        .bench
        .actions()
        .create_command(&format!("touch {}", marker.display()))
        .unwrap();
    let wp = f
        .bench
        .monitor()
        .add_watchpoint(&f.region, 0x1000, 4, WatchKind::Write, 0)
        .unwrap();
    f.bench.monitor().bind_action(wp, action).unwrap();

    f.bench.memory().write_u32(&f.region, 0x1000, 1).unwrap();
    assert!(marker.exists());
}

#[cfg(unix)]
#[test]
fn rule_gates_script_action() {
    let f = fixture();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("alarm");

    let alarm = f
        .bench
        .actions()
        .create_command(&format!("touch {}", marker.display()))
        .unwrap();

    let rule = f.bench.rules().create("overtemp").unwrap();
    f.bench
        .rules()
        .set_condition(rule, |ctx| ctx.value > 10)
        .unwrap();
    f.bench.rules().add_action(rule, alarm).unwrap();
    f.bench.rules().enable(rule).unwrap();

    let bench_in = f.bench.clone();
    let gate = f
        .bench
        .actions()
        .create_callback(move |ctx| match bench_in.rules().find_by_name("overtemp") {
            Some(rule) => bench_in.rules().evaluate(rule, ctx),
            None => Ok(()),
        });
    let wp = f
        .bench
        .monitor()
        .add_watchpoint(&f.region, 0x1000, 4, WatchKind::Write, 0)
        .unwrap();
    f.bench.monitor().bind_action(wp, gate).unwrap();

    f.bench.memory().write_u32(&f.region, 0x1000, 5).unwrap();
    assert!(!marker.exists());
    f.bench.memory().write_u32(&f.region, 0x1000, 15).unwrap();
    assert!(marker.exists());
}

#[test]
fn rule_failure_wraps_cause() {
    let f = fixture();
    let missing_action = {
        let id = f.bench.actions().create_callback(|_ctx| Ok(()));
        f.bench.actions().destroy(id).unwrap();
        id
    };

    let rule = f.bench.rules().create("r").unwrap();
    f.bench.rules().set_condition(rule, |_ctx| true).unwrap();
    f.bench.rules().add_action(rule, missing_action).unwrap();
    f.bench.rules().enable(rule).unwrap();

    let bench_in = f.bench.clone();
    let gate = f
        .bench
        .actions()
        .create_callback(move |ctx| match bench_in.rules().find_by_name("r") {
            Some(rule) => bench_in.rules().evaluate(rule, ctx),
            None => Ok(()),
        });
    let wp = f
        .bench
        .monitor()
        .add_watchpoint(&f.region, 0x1000, 4, WatchKind::Write, 0)
        .unwrap();
    f.bench.monitor().bind_action(wp, gate).unwrap();

    assert_eq!(
        f.bench.memory().write_u32(&f.region, 0x1000, 1).err(),
        Some(BenchError::RuleActionFailed(Box::new(
            BenchError::ActionNotFound(missing_action)
        )))
    );
}
