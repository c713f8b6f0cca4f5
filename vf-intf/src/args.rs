// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use vf_util::*;

use super::{DFL_NR_SOURCES, DFL_PATTERN, PATTERN_SLOT};

pub const INTERVAL_MIN: f64 = 1.0;
pub const INTERVAL_MAX: f64 = 10.0;

const HELP_BODY: &str = "\
NVMe VF benchmark monitor.

vf-monitor polls the fio json result file of each benchmarked VF, keeps
running averages of the extracted metrics and a bounded history of the
average IOPS, and prints a summary table on every tick. Optionally, each
tick's snapshot is written to a json report file.

Result files are expected to be rewritten by the benchmark at any time.
Missing, empty and malformed files are tolerated. The last good reading of
a VF stays in effect until a new good one arrives.

Gating policies decide when a tick counts toward the averages:

 * any: At least one VF has usable data (default)

 * all: Every VF has usable data

Zero policies decide whether a successful zero IOPS reading is a sample:

 * count: Zero readings are averaged in (default)

 * exclude: Zero readings are skipped
";

/// When a polling tick counts toward the running averages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatingPolicy {
    /// At least one source has fresh or last-known-good data.
    AnyValid,
    /// Every source has fresh or last-known-good data.
    AllValid,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self::AnyValid
    }
}

impl FromStr for GatingPolicy {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        Ok(match input {
            "any" => Self::AnyValid,
            "all" => Self::AllValid,
            _ => bail!("unknown gating policy {:?}, expected any or all", input),
        })
    }
}

impl fmt::Display for GatingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyValid => write!(f, "any"),
            Self::AllValid => write!(f, "all"),
        }
    }
}

/// Whether a successfully parsed zero IOPS reading is a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroPolicy {
    Count,
    Exclude,
}

impl Default for ZeroPolicy {
    fn default() -> Self {
        Self::Count
    }
}

impl FromStr for ZeroPolicy {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        Ok(match input {
            "count" => Self::Count,
            "exclude" => Self::Exclude,
            _ => bail!("unknown zero policy {:?}, expected count or exclude", input),
        })
    }
}

impl fmt::Display for ZeroPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Exclude => write!(f, "exclude"),
        }
    }
}

lazy_static! {
    static ref ARGS_STR: String = format!(
        "-d, --dir=[DIR]         'Directory holding the result files (default: {dfl_dir})'
         -n, --sources=[NR]      'Number of VFs to monitor (default: {dfl_sources})'
         -p, --pattern=[PAT]     'Result file name pattern, {{}} is the VF index (default: {dfl_pattern})'
         -i, --interval=[DUR]    'Polling interval, clamped between {min}s and {max}s (default: {dfl_intv}s)'
         -H, --history=[NR]      'Number of history entries to keep (default: {dfl_hist})'
         -g, --gating=[POLICY]   'When a tick counts toward averages, any or all (default: {dfl_gating})'
         -z, --zero=[POLICY]     'Zero IOPS readings, count or exclude (default: {dfl_zero})'
         -r, --report=[FILE]     'Write the snapshot of each tick to FILE'
         -c, --cmd=[FILE]        'Command file to honor suspend and resume from'
         -a, --args=[FILE]       'Load base command line arguments from FILE'
             --once              'Poll once, print the summary and exit'
             --quiet             'Do not print the summary table'
         -v...                   'Sets the level of verbosity'",
        dfl_dir = Args::default().dir,
        dfl_sources = DFL_NR_SOURCES,
        dfl_pattern = DFL_PATTERN,
        min = INTERVAL_MIN,
        max = INTERVAL_MAX,
        dfl_intv = Args::default().interval,
        dfl_hist = Args::default().history,
        dfl_gating = GatingPolicy::default(),
        dfl_zero = ZeroPolicy::default(),
    );
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Args {
    pub dir: String,
    pub sources: usize,
    pub pattern: String,
    pub interval: f64,
    pub history: usize,
    pub gating: GatingPolicy,
    pub zero: ZeroPolicy,
    pub report: Option<String>,
    pub cmd: Option<String>,

    #[serde(skip)]
    pub once: bool,
    #[serde(skip)]
    pub quiet: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dir: ".".into(),
            sources: DFL_NR_SOURCES,
            pattern: DFL_PATTERN.into(),
            interval: 3.0,
            history: 100,
            gating: Default::default(),
            zero: Default::default(),
            report: None,
            cmd: None,
            once: false,
            quiet: false,
        }
    }
}

impl Args {
    pub fn source_path(&self, idx: usize) -> PathBuf {
        super::source_path(&self.dir, &self.pattern, idx)
    }

    /// Clamp the interval into its allowed range and reject settings the
    /// monitor can't run with.
    pub fn sanitize(&mut self) -> Result<()> {
        if self.sources == 0 {
            bail!("at least one source is needed");
        }
        if self.history == 0 {
            bail!("history capacity must be positive");
        }
        if !self.pattern.contains(PATTERN_SLOT) {
            bail!("pattern {:?} doesn't contain {:?}", &self.pattern, PATTERN_SLOT);
        }
        if !self.interval.is_finite() || self.interval < INTERVAL_MIN || self.interval > INTERVAL_MAX
        {
            let clamped = if self.interval.is_finite() {
                self.interval.max(INTERVAL_MIN).min(INTERVAL_MAX)
            } else {
                Self::default().interval
            };
            warn!(
                "cfg: Polling interval {}s out of range, using {}s",
                self.interval, clamped
            );
            self.interval = clamped;
        }
        Ok(())
    }
}

/// Empty value resets to the default.
fn parse_or_dfl<T>(v: &str, dfl: T, what: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: fmt::Display,
{
    if v.is_empty() {
        return Ok(dfl);
    }
    match v.parse::<T>() {
        Ok(v) => Ok(v),
        Err(e) => bail!("invalid {} {:?} ({})", what, v, e),
    }
}

impl JsonLoad for Args {
    fn loaded(&mut self, _prev: Option<&mut Self>) -> Result<()> {
        self.sanitize()
    }
}

impl JsonSave for Args {}

impl JsonArgs for Args {
    fn match_cmdline() -> clap::ArgMatches<'static> {
        clap::App::new("vf-monitor")
            .version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
            .about(HELP_BODY)
            .args_from_usage(&ARGS_STR)
            .setting(clap::AppSettings::UnifiedHelpMessage)
            .setting(clap::AppSettings::DeriveDisplayOrder)
            .get_matches()
    }

    fn verbosity(matches: &clap::ArgMatches) -> u32 {
        matches.occurrences_of("v") as u32
    }

    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> Result<bool> {
        let dfl = Args::default();
        let mut updated_base = false;

        if let Some(v) = matches.value_of("dir") {
            self.dir = if v.is_empty() { dfl.dir.clone() } else { v.into() };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("sources") {
            self.sources = parse_or_dfl(v, dfl.sources, "source count")?;
            updated_base = true;
        }
        if let Some(v) = matches.value_of("pattern") {
            self.pattern = if v.is_empty() {
                dfl.pattern.clone()
            } else {
                v.into()
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("interval") {
            self.interval = if v.is_empty() {
                dfl.interval
            } else {
                parse_duration(v).context("parsing --interval")?
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("history") {
            self.history = parse_or_dfl(v, dfl.history, "history capacity")?;
            updated_base = true;
        }
        if let Some(v) = matches.value_of("gating") {
            self.gating = parse_or_dfl(v, dfl.gating, "gating policy")?;
            updated_base = true;
        }
        if let Some(v) = matches.value_of("zero") {
            self.zero = parse_or_dfl(v, dfl.zero, "zero policy")?;
            updated_base = true;
        }
        if let Some(v) = matches.value_of("report") {
            self.report = if v.is_empty() { None } else { Some(v.into()) };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("cmd") {
            self.cmd = if v.is_empty() { None } else { Some(v.into()) };
            updated_base = true;
        }

        self.once = matches.is_present("once");
        self.quiet = matches.is_present("quiet");

        self.sanitize()?;
        Ok(updated_base)
    }
}
