// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use log::info;
use simplelog as sl;
use std::cell::RefCell;
use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::thread_local;
use std::time::Duration;

pub mod json_file;

pub use json_file::{JsonArgs, JsonArgsHelper, JsonConfigFile, JsonLoad, JsonReportFile, JsonSave};

pub const TO_PCT: f64 = 100.0;
pub const KB_PER_MB: f64 = 1024.0;
pub const NSEC_PER_MSEC: f64 = 1_000_000.0;
pub const MSEC: f64 = 1.0 / 1000.0;

/// Print `val` scaled by the first unit which brings it under three
/// significant digits. `units` are `(divisor, limit, suffix)` in ascending
/// order.
fn format_scaled(val: f64, units: &[(f64, f64, &str)], zero: &str) -> String {
    if val == 0.0 {
        return zero.to_string();
    }
    for (div, limit, suffix) in units {
        let v = val / div;
        if v < 99.95 {
            return format!("{:.1}{}", v.max(0.1), suffix);
        } else if v < *limit {
            return format!("{:.0}{}", v, suffix);
        }
    }
    "INF".into()
}

fn format_count_internal<T>(count: T, zero: &str) -> String
where
    T: num::ToPrimitive,
{
    let count = count.to_f64().unwrap_or(0.0).round();
    if count < 0.0 {
        "NEG".into()
    } else if count == 0.0 {
        zero.to_string()
    } else if count < 1000.0 {
        format!("{}", count as u64)
    } else {
        format_scaled(
            count,
            &[
                (1e3, 1000.0, "k"),
                (1e6, 1000.0, "m"),
                (1e9, 1000.0, "g"),
                (1e12, 1000.0, "p"),
            ],
            zero,
        )
    }
}

pub fn format_count<T>(count: T) -> String
where
    T: num::ToPrimitive,
{
    format_count_internal(count, "0")
}

pub fn format_count_dashed<T>(count: T) -> String
where
    T: num::ToPrimitive,
{
    format_count_internal(count, "-")
}

fn format_duration_internal(dur: f64, zero: &str) -> String {
    // Work on whole nanoseconds so that e.g. 0.3s doesn't print as 299.99ms.
    let nsecs = (dur * 1_000_000_000.0).round();
    if nsecs < 0.0 {
        return "NEG".into();
    }
    format_scaled(
        nsecs,
        &[
            (1.0, 1000.0, "n"),
            (1e3, 1000.0, "u"),
            (1e6, 1000.0, "m"),
            (1e9, 60.0, "s"),
            (1e9 * 60.0, 60.0, "M"),
            (1e9 * 3600.0, 24.0, "H"),
            (1e9 * 86400.0, 365.0, "D"),
        ],
        zero,
    )
}

pub fn format_duration(dur: f64) -> String {
    format_duration_internal(dur, "0")
}

pub fn format_duration_dashed(dur: f64) -> String {
    format_duration_internal(dur, "-")
}

fn format_pct_internal(ratio: f64, zero: &str) -> String {
    let pct = ratio * TO_PCT;
    if pct < 0.0 {
        "NEG".into()
    } else if pct == 0.0 {
        zero.to_string()
    } else if pct < 99.95 {
        format!("{:.1}", pct)
    } else if pct < 9999.5 {
        format!("{:.0}", pct)
    } else {
        "INF".into()
    }
}

pub fn format_pct(ratio: f64) -> String {
    format_pct_internal(ratio, "0")
}

pub fn format_pct_dashed(ratio: f64) -> String {
    format_pct_internal(ratio, "-")
}

/// Parse durations like "3", "2500m" or "1M30s" into seconds. Underscores
/// are ignored and a trailing number without a unit is in seconds.
pub fn parse_duration(input: &str) -> Result<f64> {
    // (numerator, denominator) in seconds, sub-second units divide so that
    // round values stay exact
    let unit = |ch: char| -> Option<(f64, f64)> {
        match ch {
            'n' => Some((1.0, 1e9)),
            'u' => Some((1.0, 1e6)),
            'm' => Some((1.0, 1e3)),
            's' => Some((1.0, 1.0)),
            'M' => Some((60.0, 1.0)),
            'H' => Some((3600.0, 1.0)),
            'D' => Some((86400.0, 1.0)),
            _ => None,
        }
    };
    let parse_num = |num: &str| -> Result<f64> {
        num.trim()
            .parse::<f64>()
            .with_context(|| format!("invalid duration {:?}", input))
    };

    let mut num = String::new();
    let mut sum = 0.0;
    for ch in input.chars().filter(|ch| *ch != '_') {
        match unit(ch) {
            Some((mult, div)) => {
                sum += parse_num(&num)? * mult / div;
                num.clear();
            }
            None => num.push(ch),
        }
    }
    if !num.trim().is_empty() {
        sum += parse_num(&num)?;
    }
    if sum < 0.0 {
        bail!("duration {:?} is negative", input);
    }
    Ok(sum)
}

pub fn custom_underline(content: &str, line_char: &str) -> String {
    let indent = content.chars().take_while(|c| *c == ' ').count();
    let len = content.chars().count() - indent;
    format!("{}\n{}{}\n", content, " ".repeat(indent), line_char.repeat(len))
}

pub fn underline(content: &str) -> String {
    custom_underline(content, "-")
}

pub fn double_underline(content: &str) -> String {
    custom_underline(content, "=")
}

fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(md) => md.is_file() && md.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Look up `name` in `$PATH`. A name containing a slash is only checked for
/// executability.
pub fn find_bin<N: AsRef<OsStr>>(name_in: N) -> Option<PathBuf> {
    let name = Path::new(name_in.as_ref());
    if name.components().count() > 1 {
        return if is_executable(name) {
            Some(name.to_owned())
        } else {
            None
        };
    }
    let dirs = env::var_os("PATH")?;
    env::split_paths(&dirs)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

pub fn init_logging(verbosity: u32) {
    if env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }

    let level = match verbosity {
        0 | 1 => sl::LevelFilter::Info,
        2 => sl::LevelFilter::Debug,
        _ => sl::LevelFilter::Trace,
    };
    let mut lcfg = sl::ConfigBuilder::new();
    lcfg.set_time_level(sl::LevelFilter::Off)
        .set_location_level(sl::LevelFilter::Off)
        .set_target_level(sl::LevelFilter::Off)
        .set_thread_level(sl::LevelFilter::Off);

    let term_ok = console::user_attended_stderr()
        && sl::TermLogger::init(
            level,
            lcfg.build(),
            sl::TerminalMode::Stderr,
            sl::ColorChoice::Auto,
        )
        .is_ok();
    if !term_ok {
        let _ = sl::SimpleLogger::init(level, lcfg.build());
    }
}

struct GlobalProgState {
    exiting: bool,
    kick_seq: u64,
}

lazy_static::lazy_static! {
    static ref PROG_STATE: Mutex<GlobalProgState> = Mutex::new(GlobalProgState {
        exiting: false,
        kick_seq: 1,
    });
    static ref PROG_WAITQ: Condvar = Condvar::new();
}

thread_local! {
    static LOCAL_KICK_SEQ: RefCell<u64> = RefCell::new(0);
}

pub fn setup_prog_state() -> Result<()> {
    ctrlc::set_handler(move || {
        info!("SIGINT/TERM received, exiting...");
        set_prog_exiting();
    })
    .context("installing SIGINT/TERM handler")
}

pub fn set_prog_exiting() {
    PROG_STATE.lock().unwrap().exiting = true;
    PROG_WAITQ.notify_all();
}

pub fn prog_exiting() -> bool {
    PROG_STATE.lock().unwrap().exiting
}

/// Wake up everyone sleeping in wait_prog_state().
pub fn prog_kick() {
    PROG_STATE.lock().unwrap().kick_seq += 1;
    PROG_WAITQ.notify_all();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgState {
    Running,
    Exiting,
    Kicked,
}

/// Sleep up to `dur` unless the program starts exiting or gets kicked.
/// Each thread sees a given kick only once.
pub fn wait_prog_state(dur: Duration) -> ProgState {
    let consume_kick = |seq: u64| {
        LOCAL_KICK_SEQ.with(|local| {
            let mut local = local.borrow_mut();
            if *local < seq {
                *local = seq;
                true
            } else {
                false
            }
        })
    };

    let mut state = PROG_STATE.lock().unwrap();
    for waited in [false, true].iter() {
        if state.exiting {
            return ProgState::Exiting;
        }
        if consume_kick(state.kick_seq) {
            return ProgState::Kicked;
        }
        if !*waited {
            state = PROG_WAITQ.wait_timeout(state, dur).unwrap().0;
        }
    }
    ProgState::Running
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_format_count() {
        for (input, expected) in &[
            (0.0, "0"),
            (7.4, "7"),
            (999.0, "999"),
            (12345.0, "12.3k"),
            (250000.0, "250k"),
            (4_500_000.0, "4.5m"),
        ] {
            assert_eq!(&super::format_count(*input), expected);
        }
        assert_eq!(super::format_count_dashed(0), "-");
    }

    #[test]
    fn test_format_duration() {
        for (input, expected) in &[
            (0.000003932, "3.9u"),
            (0.00448, "4.5m"),
            (0.3, "300m"),
            (2.5, "2.5s"),
            (2042.0, "34.0M"),
        ] {
            let result = super::format_duration(*input);
            println!("{} -> {} ({})", input, &result, expected);
            assert_eq!(&result, expected);
        }
        assert_eq!(super::format_duration_dashed(0.0), "-");
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(super::format_pct(0.0), "0");
        assert_eq!(super::format_pct(0.25), "25.0");
        assert_eq!(super::format_pct(1.0), "100");
        assert_eq!(super::format_pct(-0.1), "NEG");
        assert_eq!(super::format_pct_dashed(0.0), "-");
    }

    #[test]
    fn test_parse_duration() {
        for (expected, input) in &[
            (3.0, "3"),
            (2.5, "2500m"),
            (1.5, "1.5s"),
            (90.0, "1M30s"),
            (90.0, "1M_30"),
            (0.25, "250m"),
        ] {
            let result = super::parse_duration(input).unwrap();
            println!("{} -> {} ({})", input, result, expected);
            assert_eq!(*expected, result);
        }
        assert!(super::parse_duration("fast").is_err());
        assert!(super::parse_duration("s").is_err());
    }

    #[test]
    fn test_underline() {
        assert_eq!(super::underline("  VF0"), "  VF0\n  ---\n");
        assert_eq!(super::double_underline("Summary"), "Summary\n=======\n");
    }

    #[test]
    fn test_find_bin() {
        assert!(super::find_bin("sh").is_some());
        assert!(super::find_bin("/nonexistent/dir/fio").is_none());
    }
}
