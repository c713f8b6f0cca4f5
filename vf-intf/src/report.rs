// Copyright (c) Facebook, Inc. and its affiliates.
use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::UNIX_EPOCH;
use vf_util::*;

use super::MetricBundle;

const REPORT_DOC: &str = "\
//
// vf-monitor metrics snapshot
//
// Rewritten on every polling tick. Bandwidths are in MB/s, latencies in
// milliseconds, cpu and queue depth utilizations and shares in percents.
//
//  timestamp: When this snapshot was taken
//  seq: Tick sequence number, starts at 1
//  counted: Whether this tick was counted toward the averages
//  nr_counted: Number of ticks counted so far
//  sources[].index: Source index
//  sources[].label: VF label
//  sources[].path: Result file being polled
//  sources[].status: Valid, ZeroIops, Missing, Empty or Malformed
//  sources[].freshness: Fresh, Stale (last known good) or Unavailable
//  sources[].warning: Why the last read failed, null if it didn't
//  sources[].current: Metrics in effect for this tick
//  sources[].average: Running averages
//  sources[].nr_samples: Number of samples in the averages
//  sources[].share_pct: Share of the summed average iops
//  sources[].current_share_pct: Share of the summed current iops
//  summary.total_iops: Sum of current iops
//  summary.total_bw: Sum of current bandwidths
//  summary.lat_mean: Mean of current mean latencies
//  summary.lat_p99: Mean of current p99 latencies
//  summary.cpu_usr: Sum of current user cpu utilizations
//  summary.cpu_sys: Sum of current system cpu utilizations
//  summary.cpu_idle: 100 * nr_sources - cpu_usr - cpu_sys, at least 0
//  history[].at: When the history entry was recorded
//  history[].avg_iops[]: Per-source average iops at that point
//
";

/// How the last read of a source went.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStatus {
    Valid,
    ZeroIops,
    Missing,
    Empty,
    Malformed,
}

impl Default for ReadStatus {
    fn default() -> Self {
        Self::Missing
    }
}

/// Where the metrics in effect for a source came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    Fresh,
    Stale,
    Unavailable,
}

impl Default for Freshness {
    fn default() -> Self {
        Self::Unavailable
    }
}

impl Freshness {
    pub fn is_usable(&self) -> bool {
        *self != Self::Unavailable
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceReport {
    pub index: usize,
    pub label: String,
    pub path: String,
    pub status: ReadStatus,
    pub freshness: Freshness,
    pub warning: Option<String>,
    pub current: MetricBundle,
    pub average: MetricBundle,
    pub nr_samples: u64,
    pub share_pct: f64,
    pub current_share_pct: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryReport {
    pub total_iops: f64,
    pub total_bw: f64,
    pub lat_mean: f64,
    pub lat_p99: f64,
    pub cpu_usr: f64,
    pub cpu_sys: f64,
    pub cpu_idle: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Local>,
    pub avg_iops: Vec<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Local>,
    pub seq: u64,
    pub counted: bool,
    pub nr_counted: u64,
    pub sources: Vec<SourceReport>,
    pub summary: SummaryReport,
    pub history: Vec<HistoryEntry>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            timestamp: DateTime::from(UNIX_EPOCH),
            seq: 0,
            counted: false,
            nr_counted: 0,
            sources: vec![],
            summary: Default::default(),
            history: vec![],
        }
    }
}

impl MetricsSnapshot {
    pub fn warnings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources
            .iter()
            .filter_map(|src| src.warning.as_deref().map(|w| (src.label.as_str(), w)))
    }
}

impl JsonLoad for MetricsSnapshot {}

impl JsonSave for MetricsSnapshot {
    fn preamble() -> Option<String> {
        Some(REPORT_DOC.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut snap = MetricsSnapshot {
            seq: 3,
            counted: true,
            nr_counted: 2,
            ..Default::default()
        };
        snap.sources.push(SourceReport {
            index: 1,
            label: "VF1".into(),
            status: ReadStatus::Malformed,
            freshness: Freshness::Stale,
            warning: Some("truncated".into()),
            current: MetricBundle::with_iops(200.0),
            ..Default::default()
        });
        snap.history.push(HistoryEntry {
            at: Local::now(),
            avg_iops: vec![200.0],
        });
        snap.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("//\n// vf-monitor metrics snapshot"));

        let loaded = MetricsSnapshot::load(&path).unwrap();
        assert_eq!(loaded.seq, 3);
        assert_eq!(loaded.sources[0].freshness, Freshness::Stale);
        assert_eq!(loaded.sources[0].current.iops, 200.0);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(
            loaded.warnings().collect::<Vec<_>>(),
            vec![("VF1", "truncated")]
        );
    }
}
