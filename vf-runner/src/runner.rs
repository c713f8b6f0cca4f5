// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use vf_util::*;

use super::fio;
use vf_intf::{Cmd, RunState, RunnerArgs};

/// How often the command file is checked while not running.
const CMD_POLL_INTV: Duration = Duration::from_secs(2);

pub struct Runner {
    args: RunnerArgs,
    fio_bin: PathBuf,
    cmd_file: JsonConfigFile<Cmd>,
    nr_rounds: u64,
}

impl Runner {
    pub fn new(args: RunnerArgs) -> Result<Self> {
        args.sanitize()?;
        let fio_bin = match find_bin(&args.fio) {
            Some(v) => v,
            None => bail!("fio binary {:?} not found", &args.fio),
        };
        let cmd_file = JsonConfigFile::<Cmd>::load_or_create(Some(&args.cmd))
            .with_context(|| format!("loading command file {:?}", &args.cmd))?;

        Ok(Self {
            args,
            fio_bin,
            cmd_file,
            nr_rounds: 0,
        })
    }

    pub fn nr_rounds(&self) -> u64 {
        self.nr_rounds
    }

    fn refresh_state(&mut self) -> RunState {
        if let Err(e) = self.cmd_file.maybe_reload() {
            warn!("runner: Failed to reload command file ({:#})", &e);
        }
        self.cmd_file.data.state()
    }

    fn rounds_done(&self) -> bool {
        self.args.rounds > 0 && self.nr_rounds >= self.args.rounds
    }

    pub fn run(&mut self) {
        let mut last_state = None;

        while !prog_exiting() && !self.rounds_done() {
            let state = self.refresh_state();
            if last_state != Some(state) {
                info!("runner: Command file says {}", state);
                last_state = Some(state);
            }

            if state != RunState::Running {
                wait_prog_state(CMD_POLL_INTV);
                continue;
            }

            info!(
                "runner: Round {} on {} devices",
                self.nr_rounds + 1,
                self.args.devices.len()
            );
            let res = fio::run_round(&self.args, &self.fio_bin);
            if res.interrupted {
                break;
            }
            self.nr_rounds += 1;
            info!(
                "runner: Round {} done, {} succeeded {} failed",
                self.nr_rounds, res.nr_ok, res.nr_failed
            );

            if !self.rounds_done() {
                wait_prog_state(Duration::from_secs_f64(self.args.gap));
            }
        }
    }
}
