// Copyright (c) Facebook, Inc. and its affiliates.
use json::JsonValue;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use vf_util::*;

use vf_intf::{MetricBundle, ReadStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("result file missing")]
    SourceMissing,
    #[error("result file empty")]
    SourceEmpty,
    #[error("malformed result ({0})")]
    SourceMalformed(String),
    #[error("zero iops")]
    SourceZero,
}

fn malformed<T, S: Into<String>>(why: S) -> Result<T, SourceError> {
    Err(SourceError::SourceMalformed(why.into()))
}

/// Outcome of reading one result file once.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReadResult {
    Valid(MetricBundle),
    ZeroIops(MetricBundle),
    Missing,
    Empty,
    Malformed(String),
}

impl RawReadResult {
    pub fn status(&self) -> ReadStatus {
        match self {
            Self::Valid(_) => ReadStatus::Valid,
            Self::ZeroIops(_) => ReadStatus::ZeroIops,
            Self::Missing => ReadStatus::Missing,
            Self::Empty => ReadStatus::Empty,
            Self::Malformed(_) => ReadStatus::Malformed,
        }
    }

    /// The freshly read bundle, `None` if the read failed.
    pub fn bundle(&self) -> Option<&MetricBundle> {
        match self {
            Self::Valid(b) | Self::ZeroIops(b) => Some(b),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<SourceError> {
        match self {
            Self::Valid(_) => None,
            Self::ZeroIops(_) => Some(SourceError::SourceZero),
            Self::Missing => Some(SourceError::SourceMissing),
            Self::Empty => Some(SourceError::SourceEmpty),
            Self::Malformed(why) => Some(SourceError::SourceMalformed(why.clone())),
        }
    }
}

impl From<Result<MetricBundle, SourceError>> for RawReadResult {
    fn from(res: Result<MetricBundle, SourceError>) -> Self {
        match res {
            Ok(b) if b.iops > 0.0 => Self::Valid(b),
            Ok(b) => Self::ZeroIops(b),
            Err(SourceError::SourceZero) => Self::ZeroIops(Default::default()),
            Err(SourceError::SourceMissing) => Self::Missing,
            Err(SourceError::SourceEmpty) => Self::Empty,
            Err(SourceError::SourceMalformed(why)) => Self::Malformed(why),
        }
    }
}

/// fio may print "note: ..." lines in front of the json document in its
/// output file. Skip everything before the first line opening an object.
fn skip_leading_notes(buf: &str) -> &str {
    let mut off = 0;
    for line in buf.split_inclusive('\n') {
        if line.trim_start().starts_with('{') {
            return &buf[off..];
        }
        off += line.len();
    }
    buf
}

fn num_or_zero(val: &JsonValue) -> f64 {
    val.as_f64().unwrap_or(0.0)
}

fn parse_iops(val: &JsonValue, what: &str) -> Result<f64, SourceError> {
    if val.is_null() {
        return Ok(0.0);
    }
    match val.as_f64() {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => malformed(format!("{} is {}", what, v)),
        None => malformed(format!("{} is not a number", what)),
    }
}

fn parse_jobs(jobs: &JsonValue) -> Result<MetricBundle, SourceError> {
    if !jobs.is_array() {
        return malformed("jobs is not an array");
    }
    if jobs.len() == 0 {
        return malformed("jobs is empty");
    }

    let job = &jobs[0];
    let read = &job["read"];
    let clat = &read["clat_ns"];

    Ok(MetricBundle {
        iops: parse_iops(&read["iops"], "jobs[0].read.iops")?,
        bw: num_or_zero(&read["bw"]) / KB_PER_MB,
        lat_mean: num_or_zero(&clat["mean"]) / NSEC_PER_MSEC,
        lat_p99: num_or_zero(&clat["percentile"]["99.000000"]) / NSEC_PER_MSEC,
        cpu_usr: num_or_zero(&job["usr_cpu"]),
        cpu_sys: num_or_zero(&job["sys_cpu"]),
        iodepth_util: num_or_zero(&job["iodepth_level"][">=64"]),
    })
}

/// Extract the metrics from the content of a result file. The three
/// accepted shapes are tried in order: fio's `jobs` array, a flat `iops`
/// and a `read` object carrying `iops`.
pub fn parse_result(buf: &str) -> Result<MetricBundle, SourceError> {
    let parsed = match json::parse(skip_leading_notes(buf)) {
        Ok(v) => v,
        Err(e) => return malformed(format!("{}", &e)),
    };
    if !parsed.is_object() {
        return malformed("top level is not an object");
    }

    if parsed.has_key("jobs") {
        parse_jobs(&parsed["jobs"])
    } else if parsed.has_key("iops") {
        Ok(MetricBundle::with_iops(parse_iops(&parsed["iops"], "iops")?))
    } else if parsed.has_key("read") {
        let read = &parsed["read"];
        if !read.is_object() {
            return malformed("read is not an object");
        }
        Ok(MetricBundle::with_iops(parse_iops(&read["iops"], "read.iops")?))
    } else {
        malformed("none of jobs, iops or read present")
    }
}

fn read_inner(path: &Path) -> Result<MetricBundle, SourceError> {
    let buf = match fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SourceError::SourceMissing),
        Err(e) => return malformed(format!("{}", &e)),
    };
    if buf.is_empty() {
        return Err(SourceError::SourceEmpty);
    }
    parse_result(&buf)
}

/// Read and classify one result file. Never fails, all I/O and parse
/// errors end up in the returned classification.
pub fn read<P: AsRef<Path>>(path: P) -> RawReadResult {
    read_inner(path.as_ref()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIO_OUTPUT: &str = r#"{
  "fio version" : "fio-3.28",
  "jobs" : [
    {
      "jobname" : "test",
      "read" : {
        "iops" : 51234.5,
        "bw" : 204938,
        "clat_ns" : {
          "mean" : 622344.5,
          "percentile" : {
            "99.000000" : 1646592
          }
        }
      },
      "usr_cpu" : 9.5,
      "sys_cpu" : 30.25,
      "iodepth_level" : {
        ">=64" : 0.0
      }
    }
  ]
}
"#;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_fio_output() {
        let b = parse_result(FIO_OUTPUT).unwrap();
        assert_eq!(b.iops, 51234.5);
        assert_eq!(b.bw, 204938.0 / 1024.0);
        assert_eq!(b.lat_mean, 0.6223445);
        assert_eq!(b.lat_p99, 1.646592);
        assert_eq!(b.cpu_usr, 9.5);
        assert_eq!(b.cpu_sys, 30.25);
        assert_eq!(b.iodepth_util, 0.0);
    }

    #[test]
    fn test_leading_notes() {
        let buf = format!(
            "note: both iodepth >= 1 and synchronous I/O engine are selected\n{}",
            FIO_OUTPUT
        );
        assert_eq!(parse_result(&buf).unwrap().iops, 51234.5);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(parse_result(r#"{"iops": 42}"#).unwrap().iops, 42.0);
        assert_eq!(parse_result(r#"{"read": {"iops": 7.5}}"#).unwrap().iops, 7.5);

        let b = parse_result(r#"{"jobs": [{"read": {"iops": 10}}], "iops": 99}"#).unwrap();
        assert_eq!(b.iops, 10.0);

        let b = parse_result(r#"{"iops": 5, "read": {"iops": 6}}"#).unwrap();
        assert_eq!(b.iops, 5.0);

        // absent fields default to zero
        let b = parse_result(r#"{"jobs": [{}]}"#).unwrap();
        assert_eq!(b, MetricBundle::default());
    }

    #[test]
    fn test_malformed() {
        for input in &[
            "{\"jobs\": [{\"read\": {\"iops\": 10",
            "[1, 2]",
            "null",
            r#"{"fio version": "fio-3.28"}"#,
            r#"{"jobs": []}"#,
            r#"{"jobs": {"read": {"iops": 1}}}"#,
            r#"{"iops": "fast"}"#,
            r#"{"iops": -3}"#,
            r#"{"read": 5}"#,
            "note: only notes\n",
        ] {
            match parse_result(input) {
                Err(SourceError::SourceMalformed(why)) => println!("{:?} -> {}", input, why),
                res => panic!("{:?} parsed as {:?}", input, res),
            }
        }
    }

    #[test]
    fn test_read_classification() {
        let dir = tempfile::tempdir().unwrap();
        let dir = dir.path();

        assert_eq!(read(dir.join("vf0.json")), RawReadResult::Missing);
        assert_eq!(read(write(dir, "vf1.json", "")).status(), ReadStatus::Empty);
        assert_eq!(
            read(write(dir, "vf2.json", "{\"jobs\": [")).status(),
            ReadStatus::Malformed
        );
        assert_eq!(
            read(write(dir, "vf3.json", r#"{"iops": 0}"#)),
            RawReadResult::ZeroIops(MetricBundle::default())
        );
        assert_eq!(
            read(write(dir, "vf4.json", r#"{"iops": 300}"#)),
            RawReadResult::Valid(MetricBundle::with_iops(300.0))
        );
        assert_eq!(read(dir).status(), ReadStatus::Malformed);
    }

    #[test]
    fn test_errors() {
        assert_eq!(RawReadResult::Valid(MetricBundle::with_iops(1.0)).error(), None);
        assert_eq!(
            RawReadResult::ZeroIops(Default::default()).error(),
            Some(SourceError::SourceZero)
        );
        assert_eq!(
            format!("{}", RawReadResult::Malformed("eof".into()).error().unwrap()),
            "malformed result (eof)"
        );
    }
}
