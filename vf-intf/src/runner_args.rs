// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vf_util::*;

use super::{CtlCmd, DFL_CMD_FILENAME, DFL_PATTERN, PATTERN_SLOT};

const GAP_MAX: f64 = 3600.0;

const HELP_BODY: &str = "\
Parallel fio runner for NVMe VF benchmarks.

vf-runner runs one fio instance per device in parallel, each writing its
json result to the matching result file (vf0.json, vf1.json...) which
vf-monitor polls. When all instances exit, it waits a bit and starts the
next round.

Rounds run only while the command file says so. --start marks the command
file active and keeps running. --suspend and --resume update the command
file for an already running vf-runner and exit.
";

lazy_static! {
    static ref ARGS_STR: String = format!(
        "-D, --devices=[LIST]    'Comma separated devices to benchmark (default: {dfl_devices})'
         -d, --dir=[DIR]         'Directory to write result files to (default: {dfl_dir})'
         -p, --pattern=[PAT]     'Result file name pattern, {{}} is the device index (default: {dfl_pattern})'
         -f, --fio=[BIN]         'fio binary (default: {dfl_fio})'
             --rw=[MODE]         'fio --rw (default: {dfl_rw})'
             --bs=[SIZE]         'fio --bs (default: {dfl_bs})'
             --iodepth=[NR]      'fio --iodepth (default: {dfl_iodepth})'
             --runtime=[DUR]     'fio --runtime, time based (default: {dfl_runtime}s)'
             --numjobs=[NR]      'fio --numjobs (default: {dfl_numjobs})'
             --size=[SIZE]       'fio --size (default: {dfl_size})'
             --ioengine=[ENGINE] 'fio --ioengine (default: fio default)'
             --direct=[BOOL]     'fio --direct=1 if true (default: {dfl_direct})'
             --sudo=[BOOL]       'Run fio through sudo (default: {dfl_sudo})'
             --gap=[DUR]         'Pause between rounds (default: {dfl_gap}s)'
             --rounds=[NR]       'Exit after NR rounds, 0 for no limit (default: 0)'
         -c, --cmd=[FILE]        'Command file (default: {dfl_cmd})'
         -a, --args=[FILE]       'Load base command line arguments from FILE'
             --start             'Mark the command file active and run'
             --suspend           'Suspend rounds of the running vf-runner and exit'
             --resume            'Resume rounds of the running vf-runner and exit'
         -v...                   'Sets the level of verbosity'",
        dfl_devices = RunnerArgs::default().devices.join(","),
        dfl_dir = RunnerArgs::default().dir,
        dfl_pattern = DFL_PATTERN,
        dfl_fio = RunnerArgs::default().fio,
        dfl_rw = RunnerArgs::default().rw,
        dfl_bs = RunnerArgs::default().bs,
        dfl_iodepth = RunnerArgs::default().iodepth,
        dfl_runtime = RunnerArgs::default().runtime,
        dfl_numjobs = RunnerArgs::default().numjobs,
        dfl_size = RunnerArgs::default().size,
        dfl_direct = RunnerArgs::default().direct,
        dfl_sudo = RunnerArgs::default().sudo,
        dfl_gap = RunnerArgs::default().gap,
        dfl_cmd = RunnerArgs::default().cmd,
    );
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerArgs {
    pub devices: Vec<String>,
    pub dir: String,
    pub pattern: String,
    pub fio: String,
    pub rw: String,
    pub bs: String,
    pub iodepth: u32,
    pub runtime: f64,
    pub numjobs: u32,
    pub size: String,
    pub ioengine: Option<String>,
    pub direct: bool,
    pub sudo: bool,
    pub gap: f64,
    pub rounds: u64,
    pub cmd: String,

    #[serde(skip)]
    pub ctl: Option<CtlCmd>,
}

impl Default for RunnerArgs {
    fn default() -> Self {
        Self {
            devices: (1..=4).map(|i| format!("/tmp/nvme0n{}", i)).collect(),
            dir: ".".into(),
            pattern: DFL_PATTERN.into(),
            fio: "fio".into(),
            rw: "randread".into(),
            bs: "4k".into(),
            iodepth: 32,
            runtime: 3.0,
            numjobs: 1,
            size: "1G".into(),
            ioengine: None,
            direct: false,
            sudo: false,
            gap: 3.0,
            rounds: 0,
            cmd: DFL_CMD_FILENAME.into(),
            ctl: None,
        }
    }
}

impl RunnerArgs {
    pub fn result_path(&self, idx: usize) -> PathBuf {
        super::source_path(&self.dir, &self.pattern, idx)
    }

    pub fn sanitize(&self) -> Result<()> {
        if self.devices.is_empty() {
            bail!("no device to benchmark");
        }
        if !self.pattern.contains(PATTERN_SLOT) {
            bail!("pattern {:?} doesn't contain {:?}", &self.pattern, PATTERN_SLOT);
        }
        if !self.runtime.is_finite() || self.runtime < 1.0 {
            bail!("invalid fio runtime {}s, must be at least a second", self.runtime);
        }
        if !self.gap.is_finite() || self.gap < 0.0 || self.gap > GAP_MAX {
            bail!("invalid gap {}s, must be between 0 and {}s", self.gap, GAP_MAX);
        }
        if self.iodepth == 0 || self.numjobs == 0 {
            bail!("iodepth and numjobs must be positive");
        }
        Ok(())
    }
}

fn parse_bool(v: &str, what: &str) -> Result<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid {} {:?}, expected true or false", what, v),
    }
}

impl JsonLoad for RunnerArgs {
    fn loaded(&mut self, _prev: Option<&mut Self>) -> Result<()> {
        self.sanitize()
    }
}
impl JsonSave for RunnerArgs {}

impl JsonArgs for RunnerArgs {
    fn match_cmdline() -> clap::ArgMatches<'static> {
        clap::App::new("vf-runner")
            .version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
            .about(HELP_BODY)
            .args_from_usage(&ARGS_STR)
            .group(clap::ArgGroup::with_name("ctl").args(&["start", "suspend", "resume"]))
            .setting(clap::AppSettings::UnifiedHelpMessage)
            .setting(clap::AppSettings::DeriveDisplayOrder)
            .get_matches()
    }

    fn verbosity(matches: &clap::ArgMatches) -> u32 {
        matches.occurrences_of("v") as u32
    }

    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> Result<bool> {
        let dfl = RunnerArgs::default();
        let mut updated_base = false;

        if let Some(v) = matches.value_of("devices") {
            self.devices = if v.is_empty() {
                dfl.devices.clone()
            } else {
                v.split(',')
                    .map(|dev| dev.trim())
                    .filter(|dev| !dev.is_empty())
                    .map(String::from)
                    .collect()
            };
            updated_base = true;
        }

        for (key, field, dfl_v) in [
            ("dir", &mut self.dir, &dfl.dir),
            ("pattern", &mut self.pattern, &dfl.pattern),
            ("fio", &mut self.fio, &dfl.fio),
            ("rw", &mut self.rw, &dfl.rw),
            ("bs", &mut self.bs, &dfl.bs),
            ("size", &mut self.size, &dfl.size),
            ("cmd", &mut self.cmd, &dfl.cmd),
        ]
        .iter_mut()
        {
            if let Some(v) = matches.value_of(*key) {
                **field = if v.is_empty() {
                    dfl_v.to_string()
                } else {
                    v.to_string()
                };
                updated_base = true;
            }
        }

        if let Some(v) = matches.value_of("iodepth") {
            self.iodepth = match v {
                "" => dfl.iodepth,
                v => v.parse().context("parsing --iodepth")?,
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("numjobs") {
            self.numjobs = match v {
                "" => dfl.numjobs,
                v => v.parse().context("parsing --numjobs")?,
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("rounds") {
            self.rounds = match v {
                "" => dfl.rounds,
                v => v.parse().context("parsing --rounds")?,
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("runtime") {
            self.runtime = match v {
                "" => dfl.runtime,
                v => parse_duration(v).context("parsing --runtime")?,
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("gap") {
            self.gap = match v {
                "" => dfl.gap,
                v => parse_duration(v).context("parsing --gap")?,
            };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("ioengine") {
            self.ioengine = if v.is_empty() { None } else { Some(v.into()) };
            updated_base = true;
        }
        if let Some(v) = matches.value_of("direct") {
            self.direct = parse_bool(v, "--direct")?;
            updated_base = true;
        }
        if let Some(v) = matches.value_of("sudo") {
            self.sudo = parse_bool(v, "--sudo")?;
            updated_base = true;
        }

        self.ctl = if matches.is_present("start") {
            Some(CtlCmd::Start)
        } else if matches.is_present("suspend") {
            Some(CtlCmd::Suspend)
        } else if matches.is_present("resume") {
            Some(CtlCmd::Resume)
        } else {
            None
        };

        self.sanitize()?;
        Ok(updated_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = RunnerArgs::default();
        args.sanitize().unwrap();
        assert_eq!(args.devices.len(), 4);
        assert_eq!(args.devices[0], "/tmp/nvme0n1");
        assert_eq!(args.result_path(3), PathBuf::from("./vf3.json"));
    }

    #[test]
    fn test_sanitize() {
        let mut args = RunnerArgs {
            devices: vec![],
            ..Default::default()
        };
        assert!(args.sanitize().is_err());

        args.devices = vec!["/dev/nvme1n1".into()];
        args.runtime = 0.5;
        assert!(args.sanitize().is_err());

        args.runtime = 10.0;
        args.iodepth = 0;
        assert!(args.sanitize().is_err());

        args.iodepth = 32;
        args.sanitize().unwrap();
        for gap in [-1.0, f64::NAN, f64::INFINITY, 1e30].iter() {
            args.gap = *gap;
            assert!(args.sanitize().is_err(), "gap {} accepted", gap);
        }
        args.gap = 0.0;
        args.sanitize().unwrap();
        args.runtime = f64::NAN;
        assert!(args.sanitize().is_err());
    }

    #[test]
    fn test_args_file_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("args.json");
        std::fs::write(&path, r#"{"gap": -1.0, "rounds": 2}"#).unwrap();
        assert!(JsonConfigFile::<RunnerArgs>::load(&path).is_err());

        std::fs::write(&path, r#"{"gap": 0.5, "rounds": 2}"#).unwrap();
        let args_file = JsonConfigFile::<RunnerArgs>::load(&path).unwrap();
        assert_eq!(args_file.data.gap, 0.5);
        assert_eq!(args_file.data.rounds, 2);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("Yes", "x").unwrap());
        assert!(!parse_bool("0", "x").unwrap());
        assert!(parse_bool("maybe", "x").is_err());
    }
}
