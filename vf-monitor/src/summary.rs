// Copyright (c) Facebook, Inc. and its affiliates.
use std::fmt::Write;
use vf_intf::{Freshness, MetricsSnapshot, ReadStatus};
use vf_util::*;

fn status_str(status: ReadStatus, freshness: Freshness) -> &'static str {
    match (status, freshness) {
        (ReadStatus::Valid, _) => "ok",
        (ReadStatus::ZeroIops, _) => "zero",
        (ReadStatus::Missing, Freshness::Stale) => "missing*",
        (ReadStatus::Missing, _) => "missing",
        (ReadStatus::Empty, Freshness::Stale) => "empty*",
        (ReadStatus::Empty, _) => "empty",
        (ReadStatus::Malformed, Freshness::Stale) => "bad*",
        (ReadStatus::Malformed, _) => "bad",
    }
}

fn format_bw(mbps: f64) -> String {
    if mbps == 0.0 {
        "-".into()
    } else {
        format!("{:.1}M", mbps)
    }
}

fn format_ms(msecs: f64) -> String {
    format_duration_dashed(msecs * MSEC)
}

/// Human readable table of a snapshot. A `*` after the status means the
/// source is showing its last known good reading.
pub fn format_snapshot(snap: &MetricsSnapshot) -> String {
    let mut buf = String::new();

    let title = format!(
        "[{}] tick {} ({} counted{})",
        snap.timestamp.format("%H:%M:%S"),
        snap.seq,
        snap.nr_counted,
        if snap.counted { "" } else { ", skipped" }
    );
    buf.push_str(&double_underline(&title));

    let header = format!(
        "{:<6} {:<9} {:>7} {:>7} {:>6} {:>6} {:>7} {:>7} {:>7} {:>8}",
        "VF", "status", "iops", "avg", "share", "cur%", "bw", "lat", "p99", "samples"
    );
    buf.push_str(&underline(&header));

    for src in snap.sources.iter() {
        let _ = writeln!(
            buf,
            "{:<6} {:<9} {:>7} {:>7} {:>6} {:>6} {:>7} {:>7} {:>7} {:>8}",
            &src.label,
            status_str(src.status, src.freshness),
            format_count_dashed(src.current.iops),
            format_count_dashed(src.average.iops),
            format_pct_dashed(src.share_pct / TO_PCT),
            format_pct_dashed(src.current_share_pct / TO_PCT),
            format_bw(src.current.bw),
            format_ms(src.current.lat_mean),
            format_ms(src.current.lat_p99),
            src.nr_samples,
        );
    }

    let sum = &snap.summary;
    let _ = writeln!(
        buf,
        "\ntotal iops={} bw={}/s lat={} p99={} cpu usr={}% sys={}% idle={}%",
        format_count(sum.total_iops),
        format_bw(sum.total_bw),
        format_ms(sum.lat_mean),
        format_ms(sum.lat_p99),
        format_pct(sum.cpu_usr / TO_PCT),
        format_pct(sum.cpu_sys / TO_PCT),
        format_pct(sum.cpu_idle / TO_PCT),
    );

    for (label, warning) in snap.warnings() {
        let _ = writeln!(buf, "[{}] {}", label, warning);
    }
    buf
}
