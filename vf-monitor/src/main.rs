// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::Result;
use log::{error, info};
use std::time::Duration;
use vf_util::*;

mod aggregate;
mod cache;
mod history;
mod poller;
mod reader;
mod snapshot;
mod state;
mod summary;

use poller::Poller;
use vf_intf::{Args, MetricsSnapshot};

fn show(args: &Args, snap: &MetricsSnapshot) {
    if !args.quiet {
        println!("{}", summary::format_snapshot(snap));
    }
}

fn run() -> Result<()> {
    let args_file = Args::init_args_and_logging()?;
    let args = &args_file.data;

    if args.once {
        let snap = Poller::once(args)?;
        show(args, &snap);
        return Ok(());
    }

    setup_prog_state()?;
    info!(
        "monitor: Polling {} sources as {:?} every {} (gating={} zero={})",
        args.sources,
        args.source_path(0),
        format_duration(args.interval),
        args.gating,
        args.zero
    );

    let poller = Poller::new(args)?;
    let mut last_seq = 0;
    loop {
        if wait_prog_state(Duration::from_secs(1)) == ProgState::Exiting {
            break;
        }
        if let Some(snap) = poller.latest() {
            if snap.seq != last_seq {
                last_seq = snap.seq;
                show(args, &snap);
            }
        }
    }

    drop(poller);
    info!("monitor: Exiting");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("monitor: {:#}", &e);
        std::process::exit(1);
    }
}
