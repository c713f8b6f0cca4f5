// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vf_util::*;

const CMD_DOC: &str = "\
//
// vf-runner / vf-monitor command file
//
// vf-runner runs fio rounds only while active and not paused. vf-monitor
// skips polling ticks while active and paused. Both reload this file when
// it changes. Use vf-runner --start, --suspend and --resume or edit the
// fields directly.
//
//  cmd_seq: Incremented on each command
//  active: Started, vf-runner stays idle until this is set
//  paused: Suspended, cleared on start and resume
//
";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtlCmd {
    Start,
    Suspend,
    Resume,
}

impl FromStr for CtlCmd {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        Ok(match input.to_lowercase().as_str() {
            "start" => Self::Start,
            "suspend" | "pause" => Self::Suspend,
            "resume" => Self::Resume,
            _ => bail!("unknown command {:?}", input),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Suspended,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Suspended => "suspended",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cmd {
    pub cmd_seq: u64,
    pub active: bool,
    pub paused: bool,
}

impl Cmd {
    pub fn apply(&mut self, cmd: CtlCmd) {
        match cmd {
            CtlCmd::Start => {
                self.active = true;
                self.paused = false;
            }
            CtlCmd::Suspend => self.paused = true,
            CtlCmd::Resume => self.paused = false,
        }
        self.cmd_seq += 1;
    }

    pub fn state(&self) -> RunState {
        match (self.active, self.paused) {
            (false, _) => RunState::Idle,
            (true, false) => RunState::Running,
            (true, true) => RunState::Suspended,
        }
    }
}

impl JsonLoad for Cmd {}

impl JsonSave for Cmd {
    fn preamble() -> Option<String> {
        Some(CMD_DOC.to_string())
    }
}
