// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use chrono::prelude::*;
use crossbeam::channel::{self, select, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::panic;
use std::sync::{Arc, Mutex};
use std::thread::{spawn, JoinHandle};
use std::time::Duration;
use vf_util::*;

use super::state::MonitorState;
use vf_intf::{Args, Cmd, MetricsSnapshot, RunState};

pub type SharedSnapshot = Arc<Mutex<Option<MetricsSnapshot>>>;

struct PollerWorker {
    state: MonitorState,
    interval: Duration,
    cmd_file: Option<JsonConfigFile<Cmd>>,
    report_file: JsonReportFile<MetricsSnapshot>,
    latest: SharedSnapshot,
    term_rx: Receiver<()>,
}

impl PollerWorker {
    fn new(args: &Args, latest: SharedSnapshot, term_rx: Receiver<()>) -> Result<Self> {
        let cmd_file = match args.cmd.as_ref() {
            Some(path) => Some(
                JsonConfigFile::<Cmd>::load_or_create(Some(path))
                    .with_context(|| format!("loading command file {:?}", path))?,
            ),
            None => None,
        };

        let report_file = JsonReportFile::<MetricsSnapshot>::new(args.report.as_ref());
        if let Some(path) = report_file.path.as_ref() {
            report_file
                .commit()
                .with_context(|| format!("initializing report file {:?}", path))?;
        }

        Ok(Self {
            state: MonitorState::new(args),
            interval: Duration::from_secs_f64(args.interval),
            cmd_file,
            report_file,
            latest,
            term_rx,
        })
    }

    fn suspended(&mut self) -> bool {
        let cmd_file = match self.cmd_file.as_mut() {
            Some(v) => v,
            None => return false,
        };
        match cmd_file.maybe_reload() {
            Ok(true) => info!("poller: Command file reloaded, {}", cmd_file.data.state()),
            Ok(false) => (),
            Err(e) => warn!("poller: Failed to reload command file ({:#})", &e),
        }
        cmd_file.data.state() == RunState::Suspended
    }

    fn tick(&mut self) -> MetricsSnapshot {
        let snap = self.state.tick(Local::now());
        trace!(
            "poller: Tick {} counted={} history={}",
            snap.seq,
            snap.counted,
            snap.history.len()
        );

        self.report_file.data = snap.clone();
        if let Err(e) = self.report_file.commit() {
            warn!("poller: Failed to commit report ({:#})", &e);
        }

        *self.latest.lock().unwrap() = Some(snap.clone());
        snap
    }

    fn run_inner(mut self) {
        let mut sleep_dur = Duration::from_secs(0);

        loop {
            select! {
                recv(self.term_rx) -> term => {
                    if let Err(e) = term {
                        debug!("poller: Term ({})", &e);
                        break;
                    }
                },
                recv(channel::after(sleep_dur)) -> _ => (),
            }
            sleep_dur = self.interval;

            if self.suspended() {
                trace!("poller: Suspended, skipping tick");
                continue;
            }
            self.tick();
            prog_kick();
        }
    }

    fn run(self) {
        if let Err(e) = panic::catch_unwind(panic::AssertUnwindSafe(|| self.run_inner())) {
            error!("poller: worker thread panicked ({:?})", &e);
            set_prog_exiting();
        }
    }
}

/// Runs the ticks on a worker thread every polling interval. The latest
/// snapshot is available through `latest()` and each new one kicks
/// `wait_prog_state()` sleepers. Dropping stops and joins the worker.
pub struct Poller {
    latest: SharedSnapshot,
    term_tx: Option<Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(args: &Args) -> Result<Self> {
        let latest: SharedSnapshot = Arc::new(Mutex::new(None));
        let (term_tx, term_rx) = channel::unbounded::<()>();
        let worker = PollerWorker::new(args, latest.clone(), term_rx)?;
        let jh = spawn(|| worker.run());
        Ok(Self {
            latest,
            term_tx: Some(term_tx),
            join_handle: Some(jh),
        })
    }

    /// Run a single tick synchronously.
    pub fn once(args: &Args) -> Result<MetricsSnapshot> {
        let (_term_tx, term_rx) = channel::unbounded::<()>();
        let mut worker = PollerWorker::new(args, Arc::new(Mutex::new(None)), term_rx)?;
        Ok(worker.tick())
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.latest.lock().unwrap().clone()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let term_tx = self.term_tx.take().unwrap();
        drop(term_tx);
        let jh = self.join_handle.take().unwrap();
        jh.join().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread::sleep;
    use std::time::Instant;
    use vf_intf::CtlCmd;

    fn test_args(dir: &std::path::Path) -> Args {
        Args {
            dir: dir.to_string_lossy().to_string(),
            sources: 2,
            interval: 1.0,
            report: Some(dir.join("report.json").to_string_lossy().to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_once_commits_report() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let args = test_args(dir.path());
        fs::write(dir.path().join("vf0.json"), r#"{"iops": 250}"#).unwrap();

        let snap = Poller::once(&args).unwrap();
        assert_eq!(snap.seq, 1);
        assert_eq!(snap.sources[0].current.iops, 250.0);

        let loaded = MetricsSnapshot::load(dir.path().join("report.json")).unwrap();
        assert_eq!(loaded.seq, 1);
        assert_eq!(loaded.sources.len(), 2);
        assert_eq!(
            loaded.sources[1].warning.as_deref(),
            Some("result file missing, no data yet")
        );
    }

    #[test]
    fn test_poller_ticks_and_stops() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let args = test_args(dir.path());
        fs::write(dir.path().join("vf1.json"), r#"{"read": {"iops": 10}}"#).unwrap();

        let poller = Poller::new(&args).unwrap();
        let started_at = Instant::now();
        while poller.latest().is_none() && started_at.elapsed() < Duration::from_secs(5) {
            sleep(Duration::from_millis(10));
        }
        let snap = poller.latest().unwrap();
        assert_eq!(snap.sources[1].current.iops, 10.0);

        let dropped_at = Instant::now();
        drop(poller);
        assert!(dropped_at.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_suspended_state() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let cmd_path = dir.path().join("cmd.json");
        let mut cmd = Cmd::default();
        cmd.apply(CtlCmd::Start);
        cmd.apply(CtlCmd::Suspend);
        cmd.save(&cmd_path).unwrap();

        let args = Args {
            cmd: Some(cmd_path.to_string_lossy().to_string()),
            ..test_args(dir.path())
        };
        let (_term_tx, term_rx) = channel::unbounded::<()>();
        let mut worker = PollerWorker::new(&args, Arc::new(Mutex::new(None)), term_rx).unwrap();
        assert!(worker.suspended());

        worker.cmd_file.as_mut().unwrap().data.apply(CtlCmd::Resume);
        assert!(!worker.suspended());
    }

    #[test]
    fn test_suspended_skips_ticks() {
        let _ = ::env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vf0.json"), r#"{"iops": 42}"#).unwrap();
        let cmd_path = dir.path().join("cmd.json");
        let mut cmd = Cmd::default();
        cmd.apply(CtlCmd::Start);
        cmd.apply(CtlCmd::Suspend);
        cmd.save(&cmd_path).unwrap();

        let args = Args {
            cmd: Some(cmd_path.to_string_lossy().to_string()),
            ..test_args(dir.path())
        };
        let poller = Poller::new(&args).unwrap();
        sleep(Duration::from_millis(1500));
        assert!(poller.latest().is_none());

        cmd.apply(CtlCmd::Resume);
        cmd.save(&cmd_path).unwrap();
        let resumed_at = Instant::now();
        while poller.latest().is_none() && resumed_at.elapsed() < Duration::from_secs(5) {
            sleep(Duration::from_millis(10));
        }
        let snap = poller.latest().unwrap();
        assert_eq!(snap.seq, 1);
        assert_eq!(snap.sources[0].current.iops, 42.0);
    }
}
