// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Split a commented json file into its leading `//` or `#` comment block
/// and the json body. Comment lines are blanked in the body so that parse
/// errors still point at the right line.
fn split_preamble(buf: &str) -> (String, String) {
    let mut preamble = String::new();
    let mut body = String::new();
    let mut in_preamble = true;

    for line in buf.lines() {
        let trimmed = line.trim_start();
        let is_comment = trimmed.starts_with("//") || trimmed.starts_with('#');
        if is_comment && in_preamble {
            preamble.push_str(line);
            preamble.push('\n');
        }
        if !is_comment {
            in_preamble = false;
            body.push_str(line);
        }
        body.push('\n');
    }
    (preamble, body)
}

fn read_json<P: AsRef<Path>>(path: P) -> Result<(String, String)> {
    let mut buf = String::new();
    fs::File::open(path)?.read_to_string(&mut buf)?;
    Ok(split_preamble(&buf))
}

pub trait JsonLoad
where
    Self: DeserializeOwned,
{
    /// Called after each load. `prev` is the previously loaded instance on
    /// reloads.
    fn loaded(&mut self, _prev: Option<&mut Self>) -> Result<()> {
        Ok(())
    }

    fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (_, body) = read_json(path)?;
        Ok(serde_json::from_str::<Self>(&body)?)
    }
}

pub trait JsonSave
where
    Self: Default + Serialize,
{
    fn preamble() -> Option<String> {
        None
    }

    fn as_json(&self) -> Result<String> {
        let mut out = Self::preamble().unwrap_or_default();
        out += &serde_json::to_string_pretty(&self)?;
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }

    /// Create `path` filled with the default value unless it already
    /// exists. Returns whether the file was created.
    fn maybe_create_dfl<P: AsRef<Path>>(path_in: P) -> Result<bool> {
        let path = path_in.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut f) => {
                f.write_all(Self::default().as_json()?.as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.as_json()?)?;
        Ok(())
    }
}

/// A json file which is loaded once and then reloaded whenever its mtime
/// changes.
#[derive(Clone, Debug)]
pub struct JsonConfigFile<T: JsonLoad + JsonSave> {
    pub path: Option<PathBuf>,
    pub loaded_mod: SystemTime,
    pub data: T,
}

impl<T: JsonLoad + JsonSave> Default for JsonConfigFile<T> {
    fn default() -> Self {
        Self {
            path: None,
            loaded_mod: UNIX_EPOCH,
            data: Default::default(),
        }
    }
}

impl<T: JsonLoad + JsonSave> JsonConfigFile<T> {
    pub fn load<P: AsRef<Path>>(path_in: P) -> Result<Self> {
        let path = path_in.as_ref();
        let loaded_mod = path.metadata()?.modified()?;
        let mut data = T::load(path).with_context(|| format!("loading {:?}", path))?;
        data.loaded(None)?;

        Ok(Self {
            path: Some(path.to_owned()),
            loaded_mod,
            data,
        })
    }

    /// Load from `path_opt` creating it with the defaults if missing. Without
    /// a path, the defaults are used and nothing touches the filesystem.
    pub fn load_or_create<P: AsRef<Path>>(path_opt: Option<P>) -> Result<Self> {
        let path = match path_opt {
            Some(v) => v,
            None => {
                let mut data: T = Default::default();
                data.loaded(None)?;
                return Ok(Self {
                    data,
                    ..Default::default()
                });
            }
        };

        if T::maybe_create_dfl(&path)? {
            info!("cfg: Created {:?}", path.as_ref());
        }
        Self::load(path)
    }

    pub fn save(&self) -> Result<()> {
        match self.path.as_deref() {
            Some(path) => self.data.save(path),
            None => Ok(()),
        }
    }

    /// Reload if the file changed since the last load. Returns whether the
    /// data was reloaded.
    pub fn maybe_reload(&mut self) -> Result<bool> {
        let path = match self.path.as_ref() {
            Some(v) => v,
            None => return Ok(false),
        };

        let modified = path.metadata()?.modified()?;
        if modified == self.loaded_mod {
            return Ok(false);
        }
        // The writer may still be at it, wait for the file to settle.
        if let Ok(age) = SystemTime::now().duration_since(modified) {
            if age.as_millis() < 10 {
                return Ok(false);
            }
        }

        let mut data = T::load(path).with_context(|| format!("reloading {:?}", path))?;
        data.loaded(Some(&mut self.data))?;
        self.data = data;
        self.loaded_mod = modified;
        Ok(true)
    }
}

pub trait JsonArgs
where
    Self: JsonLoad + JsonSave,
{
    fn match_cmdline() -> clap::ArgMatches<'static>;
    fn verbosity(matches: &clap::ArgMatches) -> u32;
    /// Apply the command line on top of the loaded args. Returns whether any
    /// persistent field changed and the args file should be updated.
    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> Result<bool>;
}

pub trait JsonArgsHelper
where
    Self: JsonArgs,
{
    fn init_args_and_logging_nosave() -> Result<(JsonConfigFile<Self>, bool)>;
    fn save_args(args_file: &JsonConfigFile<Self>) -> Result<()>;
    fn init_args_and_logging() -> Result<JsonConfigFile<Self>>;
}

impl<T> JsonArgsHelper for T
where
    T: JsonArgs,
{
    fn init_args_and_logging_nosave() -> Result<(JsonConfigFile<T>, bool)> {
        let matches = T::match_cmdline();
        super::init_logging(T::verbosity(&matches));

        let mut args_file = JsonConfigFile::<T>::load_or_create(matches.value_of("args"))?;
        let updated = args_file.data.process_cmdline(&matches)?;
        Ok((args_file, updated))
    }

    fn save_args(args_file: &JsonConfigFile<T>) -> Result<()> {
        if let Some(path) = args_file.path.as_ref() {
            info!("cfg: Updating command line arguments file {:?}", path);
            args_file.save()?;
        }
        Ok(())
    }

    fn init_args_and_logging() -> Result<JsonConfigFile<T>> {
        let (args_file, updated) = Self::init_args_and_logging_nosave()?;
        if updated {
            Self::save_args(&args_file)?;
        }
        Ok(args_file)
    }
}

/// An output json file which is replaced atomically on each commit so that
/// readers never see a partial write.
#[derive(Debug)]
pub struct JsonReportFile<T: JsonSave> {
    pub path: Option<PathBuf>,
    pub staging: PathBuf,
    pub data: T,
}

impl<T: JsonSave> JsonReportFile<T> {
    pub fn new<P: AsRef<Path>>(path_opt: Option<P>) -> Self {
        let (path, staging) = match path_opt {
            Some(p) => {
                let path = p.as_ref().to_owned();
                let mut staging = path.clone().into_os_string();
                staging.push(".staging");
                (Some(path), PathBuf::from(staging))
            }
            None => (None, PathBuf::new()),
        };

        Self {
            path,
            staging,
            data: Default::default(),
        }
    }

    pub fn commit(&self) -> Result<()> {
        let path = match self.path.as_ref() {
            Some(v) => v,
            None => return Ok(()),
        };
        self.data.save(&self.staging)?;
        fs::rename(&self.staging, path)
            .with_context(|| format!("renaming {:?} to {:?}", &self.staging, path))?;
        Ok(())
    }
}
