// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use log::{error, info};
use vf_util::*;

mod fio;
mod runner;

use runner::Runner;
use vf_intf::{Cmd, CtlCmd, RunnerArgs};

fn apply_ctl(args: &RunnerArgs, ctl: CtlCmd) -> Result<()> {
    let mut cmd_file = JsonConfigFile::<Cmd>::load_or_create(Some(&args.cmd))
        .with_context(|| format!("loading command file {:?}", &args.cmd))?;
    cmd_file.data.apply(ctl);
    cmd_file
        .save()
        .with_context(|| format!("updating command file {:?}", &args.cmd))?;
    info!(
        "runner: {:?} applied to {:?}, now {}",
        ctl,
        &args.cmd,
        cmd_file.data.state()
    );
    Ok(())
}

fn run() -> Result<()> {
    let args_file = RunnerArgs::init_args_and_logging()?;
    let args = args_file.data;

    if let Some(ctl) = args.ctl {
        apply_ctl(&args, ctl)?;
        if ctl != CtlCmd::Start {
            return Ok(());
        }
    }

    setup_prog_state()?;
    let mut runner = Runner::new(args)?;
    runner.run();
    info!("runner: Exiting after {} rounds", runner.nr_rounds());
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("runner: {:#}", &e);
        std::process::exit(1);
    }
}
