// Copyright (c) Facebook, Inc. and its affiliates.
use std::path::{Path, PathBuf};

pub mod args;
pub mod cmd;
pub mod metrics;
pub mod report;
pub mod runner_args;

pub use args::{Args, GatingPolicy, ZeroPolicy};
pub use cmd::{Cmd, CtlCmd, RunState};
pub use metrics::MetricBundle;
pub use report::{
    Freshness, HistoryEntry, MetricsSnapshot, ReadStatus, SourceReport, SummaryReport,
};
pub use runner_args::RunnerArgs;

pub const DFL_NR_SOURCES: usize = 4;
pub const DFL_PATTERN: &str = "vf{}.json";
pub const DFL_CMD_FILENAME: &str = "cmd.json";
pub const PATTERN_SLOT: &str = "{}";

/// Result file path of the `idx`'th source. `{}` in `pattern` is replaced
/// with the index.
pub fn source_path<P: AsRef<Path>>(dir: P, pattern: &str, idx: usize) -> PathBuf {
    dir.as_ref()
        .join(pattern.replace(PATTERN_SLOT, &idx.to_string()))
}

pub fn source_label(idx: usize) -> String {
    format!("VF{}", idx)
}
