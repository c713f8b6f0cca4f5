// Copyright (c) Facebook, Inc. and its affiliates.
use chrono::prelude::*;
use log::{debug, info, warn};
use std::path::PathBuf;
use vf_intf::{source_label, Args, Freshness, MetricsSnapshot, ReadStatus, SourceReport};

use super::aggregate::{Aggregator, TickInput};
use super::cache::StalenessCache;
use super::history::HistoryBuffer;
use super::reader::{self, RawReadResult};
use super::snapshot;

#[derive(Debug)]
pub struct Source {
    pub index: usize,
    pub label: String,
    pub path: PathBuf,
    last_status: Option<ReadStatus>,
}

impl Source {
    fn new(index: usize, path: PathBuf) -> Self {
        Self {
            index,
            label: source_label(index),
            path,
            last_status: None,
        }
    }

    /// Log status changes loudly and persisting failures quietly. Returns
    /// the warning to attach to the snapshot.
    fn note_read(&mut self, raw: &RawReadResult, freshness: Freshness) -> Option<String> {
        let status = raw.status();
        let changed = self.last_status != Some(status);
        let prev = self.last_status.replace(status);

        let err = match raw.error() {
            Some(v) => v,
            None => {
                if changed && prev.is_some() {
                    info!("reader: {} recovered ({:?})", &self.label, &self.path);
                }
                return None;
            }
        };

        let warning = match freshness {
            Freshness::Fresh => format!("{}", &err),
            Freshness::Stale => format!("{}, showing last known good", &err),
            Freshness::Unavailable => format!("{}, no data yet", &err),
        };
        if changed {
            warn!("reader: {} {:?}: {}", &self.label, &self.path, &warning);
        } else {
            debug!("reader: {} {:?}: {}", &self.label, &self.path, &warning);
        }
        Some(warning)
    }
}

/// Everything a monitoring session accumulates. Owned by whoever drives
/// the ticks.
#[derive(Debug)]
pub struct MonitorState {
    sources: Vec<Source>,
    cache: StalenessCache,
    agg: Aggregator,
    history: HistoryBuffer,
    seq: u64,
}

impl MonitorState {
    pub fn new(args: &Args) -> Self {
        let nr = args.sources;
        Self {
            sources: (0..nr).map(|i| Source::new(i, args.source_path(i))).collect(),
            cache: StalenessCache::new(nr),
            agg: Aggregator::new(nr, args.gating, args.zero),
            history: HistoryBuffer::new(args.history),
            seq: 0,
        }
    }

    /// Read every source back to back and fold the results in.
    pub fn tick(&mut self, now: DateTime<Local>) -> MetricsSnapshot {
        let raws: Vec<RawReadResult> = self
            .sources
            .iter()
            .map(|src| reader::read(&src.path))
            .collect();
        self.tick_with(now, raws)
    }

    fn tick_with(&mut self, now: DateTime<Local>, raws: Vec<RawReadResult>) -> MetricsSnapshot {
        self.seq += 1;

        let mut inputs = Vec::with_capacity(raws.len());
        let mut signal_iops = Vec::with_capacity(raws.len());
        let mut reports = Vec::with_capacity(raws.len());

        for (src, raw) in self.sources.iter_mut().zip(raws.iter()) {
            let (bundle, freshness) = self.cache.get_or_fallback(src.index, raw);
            let warning = src.note_read(raw, freshness);

            inputs.push(TickInput {
                bundle,
                freshness,
                fresh_zero: raw.status() == ReadStatus::ZeroIops,
            });
            signal_iops.push(raw.bundle().map(|b| b.iops).unwrap_or(0.0));
            reports.push(SourceReport {
                index: src.index,
                label: src.label.clone(),
                path: src.path.display().to_string(),
                status: raw.status(),
                freshness,
                warning,
                current: bundle,
                ..Default::default()
            });
        }

        let out = self.agg.update(&inputs);
        let avg_iops: Vec<f64> = out.averages.iter().map(|b| b.iops).collect();
        if !self.history.maybe_append(now, &signal_iops, &avg_iops) {
            debug!(
                "monitor: No signal in tick {}, history stays at {} entries",
                self.seq,
                self.history.len()
            );
        }

        snapshot::assemble(
            now,
            self.seq,
            reports,
            &out,
            self.agg.nr_counted(),
            self.history.entries(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn setup(dir: &Path) -> MonitorState {
        let _ = ::env_logger::try_init();
        let args = Args {
            dir: dir.to_string_lossy().to_string(),
            sources: 4,
            history: 10,
            ..Default::default()
        };
        MonitorState::new(&args)
    }

    fn write_iops(dir: &Path, idx: usize, iops: f64) {
        let content = format!(
            r#"{{"jobs": [{{"read": {{"iops": {}, "bw": 1024}}, "usr_cpu": 5.0}}]}}"#,
            iops
        );
        fs::write(dir.join(format!("vf{}.json", idx)), content).unwrap();
    }

    fn iops_of(snap: &MetricsSnapshot, f: impl Fn(&SourceReport) -> f64) -> Vec<f64> {
        snap.sources.iter().map(f).collect()
    }

    #[test]
    fn test_missing_source_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        let mut state = setup(dir);

        for (i, iops) in [100.0, 200.0, 300.0, 400.0].iter().enumerate() {
            write_iops(dir, i, *iops);
        }
        let snap = state.tick(Local::now());
        assert!(snap.counted);
        assert_eq!(iops_of(&snap, |s| s.average.iops), vec![100.0, 200.0, 300.0, 400.0]);
        assert_eq!(iops_of(&snap, |s| s.current.iops), vec![100.0, 200.0, 300.0, 400.0]);
        assert_eq!(iops_of(&snap, |s| s.share_pct), vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(snap.summary.total_iops, 1000.0);
        assert_eq!(snap.history.len(), 1);

        fs::remove_file(dir.join("vf1.json")).unwrap();
        let snap = state.tick(Local::now());
        let vf1 = &snap.sources[1];
        assert_eq!(vf1.status, ReadStatus::Missing);
        assert_eq!(vf1.freshness, Freshness::Stale);
        assert_eq!(vf1.current.iops, 200.0);
        assert!(vf1.warning.as_ref().unwrap().contains("missing"));
        assert_eq!(iops_of(&snap, |s| s.average.iops), vec![100.0, 200.0, 300.0, 400.0]);
        assert!(snap.sources.iter().all(|s| s.nr_samples == 2));
        assert_eq!(snap.nr_counted, 2);
        assert_eq!(snap.seq, 2);
        assert_eq!(snap.warnings().count(), 1);
    }

    #[test]
    fn test_malformed_source_uses_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        let mut state = setup(dir);

        for vf2_iops in [100.0, 300.0].iter() {
            for i in 0..4 {
                write_iops(dir, i, if i == 2 { *vf2_iops } else { 100.0 });
            }
            state.tick(Local::now());
        }

        // stale samples keep counting, pulling the average toward 300
        fs::write(dir.join("vf2.json"), "{\"jobs\": [{\"read\": {\"io").unwrap();
        let expected = [700.0 / 3.0, 250.0, 260.0];
        for (tick, avg) in expected.iter().enumerate() {
            for i in [0, 1, 3].iter() {
                write_iops(dir, *i, 200.0 + tick as f64);
            }
            let snap = state.tick(Local::now());
            let vf2 = &snap.sources[2];
            assert_eq!(vf2.status, ReadStatus::Malformed);
            assert_eq!(vf2.freshness, Freshness::Stale);
            assert_eq!(vf2.current.iops, 300.0);
            assert_eq!(vf2.average.iops, *avg);
            assert_eq!(vf2.nr_samples, tick as u64 + 3);
            assert!(vf2.warning.is_some());
            assert_eq!(snap.history.len(), tick + 3);
        }
        assert_eq!(state.sources[2].last_status, Some(ReadStatus::Malformed));
    }

    #[test]
    fn test_silent_tick() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();
        let mut state = setup(dir);

        let snap = state.tick(Local::now());
        assert!(!snap.counted);
        assert_eq!(snap.nr_counted, 0);
        assert!(snap.history.is_empty());
        assert!(snap
            .sources
            .iter()
            .all(|s| s.freshness == Freshness::Unavailable && s.average.iops == 0.0));

        // stale fallbacks alone aren't signal
        write_iops(dir, 0, 500.0);
        let snap = state.tick(Local::now());
        assert_eq!(snap.history.len(), 1);
        fs::write(dir.join("vf0.json"), "").unwrap();
        write_iops(dir, 1, 0.0);
        let snap = state.tick(Local::now());
        assert!(snap.counted);
        assert_eq!(snap.sources[0].freshness, Freshness::Stale);
        assert_eq!(snap.sources[1].status, ReadStatus::ZeroIops);
        assert_eq!(snap.history.len(), 1);
    }
}
