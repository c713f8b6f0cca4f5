// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use vf_util::*;

use vf_intf::RunnerArgs;

const REAP_INTV: Duration = Duration::from_millis(100);

/// fio arguments benchmarking `dev` and writing the json result to the
/// `idx`'th result file.
pub fn fio_args(args: &RunnerArgs, idx: usize, dev: &str) -> Vec<String> {
    let mut cmdline = vec![
        format!("--name=vf{}", idx),
        format!("--filename={}", dev),
        format!("--rw={}", &args.rw),
        format!("--bs={}", &args.bs),
        format!("--iodepth={}", args.iodepth),
        format!("--runtime={}", args.runtime.round() as u64),
        "--time_based".into(),
        format!("--numjobs={}", args.numjobs),
        "--group_reporting".into(),
        format!("--size={}", &args.size),
    ];
    if args.direct {
        cmdline.push("--direct=1".into());
    }
    if let Some(engine) = args.ioengine.as_ref() {
        cmdline.push(format!("--ioengine={}", engine));
    }
    cmdline.push("--output-format=json".into());
    cmdline.push(format!("--output={}", args.result_path(idx).display()));
    cmdline
}

fn spawn_one(args: &RunnerArgs, fio_bin: &Path, idx: usize, dev: &str) -> Result<Child> {
    let mut cmd = if args.sudo {
        let mut cmd = Command::new("sudo");
        cmd.arg(fio_bin);
        cmd
    } else {
        Command::new(fio_bin)
    };
    cmd.args(fio_args(args, idx, dev))
        .stdin(Stdio::null())
        .stdout(Stdio::null());

    debug!("runner: Spawning {:?}", &cmd);
    cmd.spawn()
        .with_context(|| format!("spawning {:?} for {:?}", fio_bin, dev))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RoundResult {
    pub nr_ok: usize,
    pub nr_failed: usize,
    pub interrupted: bool,
}

fn kill_all(children: &mut Vec<(usize, Child)>) {
    for (_, child) in children.iter_mut() {
        let _ = child.kill();
    }
    for (_, mut child) in children.drain(..) {
        let _ = child.wait();
    }
}

/// Run one fio per device in parallel and wait for all of them. Failures
/// are logged per device and don't affect the rest. If the program starts
/// exiting, the remaining instances are killed.
pub fn run_round(args: &RunnerArgs, fio_bin: &Path) -> RoundResult {
    let mut res = RoundResult::default();
    let mut children = vec![];

    for (idx, dev) in args.devices.iter().enumerate() {
        match spawn_one(args, fio_bin, idx, dev) {
            Ok(child) => children.push((idx, child)),
            Err(e) => {
                warn!("runner: {:#}", &e);
                res.nr_failed += 1;
            }
        }
    }

    while !children.is_empty() {
        if prog_exiting() {
            info!("runner: Killing {} fio instances", children.len());
            kill_all(&mut children);
            res.interrupted = true;
            break;
        }

        let mut i = 0;
        while i < children.len() {
            let (idx, child) = &mut children[i];
            let dev = &args.devices[*idx];
            match child.try_wait() {
                Ok(Some(status)) if status.success() => {
                    debug!("runner: fio on {:?} finished", dev);
                    res.nr_ok += 1;
                }
                Ok(Some(status)) => {
                    warn!("runner: fio on {:?} failed ({})", dev, &status);
                    res.nr_failed += 1;
                }
                Ok(None) => {
                    i += 1;
                    continue;
                }
                Err(e) => {
                    warn!("runner: Failed to wait for fio on {:?} ({})", dev, &e);
                    let _ = child.kill();
                    let _ = child.wait();
                    res.nr_failed += 1;
                }
            }
            children.swap_remove(i);
        }

        if !children.is_empty() {
            wait_prog_state(REAP_INTV);
        }
    }
    res
}

/// A stand-in fio which writes a minimal result to its --output.
#[cfg(test)]
pub fn fake_fio(dir: &Path, exit_code: i32) -> std::path::PathBuf {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(format!("fake-fio-{}", exit_code));
    fs::write(
        &path,
        format!(
            "#!/bin/sh\n\
             for arg in \"$@\"; do\n\
             \tcase \"$arg\" in\n\
             \t--output=*) echo '{{\"iops\": 123}}' > \"${{arg#--output=}}\";;\n\
             \tesac\n\
             done\n\
             exit {}\n",
            exit_code
        ),
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
