// Copyright (c) Facebook, Inc. and its affiliates.
use chrono::prelude::*;
use vf_intf::{HistoryEntry, MetricBundle, MetricsSnapshot, SourceReport, SummaryReport};
use vf_util::*;

use super::aggregate::{safe_div, shares, AggregateOutput};

/// Summary figures over the bundles in effect for this tick.
pub fn summarize(currents: &[MetricBundle]) -> SummaryReport {
    let nr = currents.len() as f64;
    let mut sum = MetricBundle::default();
    for cur in currents.iter() {
        sum += cur;
    }

    SummaryReport {
        total_iops: sum.iops,
        total_bw: sum.bw,
        lat_mean: safe_div(sum.lat_mean, nr),
        lat_p99: safe_div(sum.lat_p99, nr),
        cpu_usr: sum.cpu_usr,
        cpu_sys: sum.cpu_sys,
        cpu_idle: (TO_PCT * nr - sum.cpu_usr - sum.cpu_sys).max(0.0),
    }
}

/// Assemble the snapshot of a tick. `sources` carry everything but the
/// averages, samples and shares which are filled from `agg`.
pub fn assemble(
    timestamp: DateTime<Local>,
    seq: u64,
    mut sources: Vec<SourceReport>,
    agg: &AggregateOutput,
    nr_counted: u64,
    history: Vec<HistoryEntry>,
) -> MetricsSnapshot {
    let currents: Vec<MetricBundle> = sources.iter().map(|src| src.current).collect();
    let cur_iops: Vec<f64> = currents.iter().map(|b| b.iops).collect();
    let cur_shares = shares(&cur_iops);

    for (i, src) in sources.iter_mut().enumerate() {
        src.average = agg.averages[i];
        src.nr_samples = agg.counts[i];
        src.share_pct = agg.shares[i];
        src.current_share_pct = cur_shares[i];
    }

    MetricsSnapshot {
        timestamp,
        seq,
        counted: agg.counted,
        nr_counted,
        summary: summarize(&currents),
        sources,
        history,
    }
}
