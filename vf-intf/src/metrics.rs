// Copyright (c) Facebook, Inc. and its affiliates.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;

/// The metrics extracted from one fio result. Bandwidth is in MB/s,
/// latencies in milliseconds and the rest in percents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricBundle {
    pub iops: f64,
    pub bw: f64,
    pub lat_mean: f64,
    pub lat_p99: f64,
    pub cpu_usr: f64,
    pub cpu_sys: f64,
    pub iodepth_util: f64,
}

impl MetricBundle {
    pub fn with_iops(iops: f64) -> Self {
        Self {
            iops,
            ..Default::default()
        }
    }
}

impl ops::AddAssign<&MetricBundle> for MetricBundle {
    fn add_assign(&mut self, rhs: &MetricBundle) {
        self.iops += rhs.iops;
        self.bw += rhs.bw;
        self.lat_mean += rhs.lat_mean;
        self.lat_p99 += rhs.lat_p99;
        self.cpu_usr += rhs.cpu_usr;
        self.cpu_sys += rhs.cpu_sys;
        self.iodepth_util += rhs.iodepth_util;
    }
}

impl<T: Into<f64>> ops::DivAssign<T> for MetricBundle {
    fn div_assign(&mut self, rhs: T) {
        let div = rhs.into();
        self.iops /= div;
        self.bw /= div;
        self.lat_mean /= div;
        self.lat_p99 /= div;
        self.cpu_usr /= div;
        self.cpu_sys /= div;
        self.iodepth_util /= div;
    }
}

impl fmt::Display for MetricBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iops={:.1} bw={:.1}MB/s lat={:.3}ms p99={:.3}ms usr={:.1}% sys={:.1}% qd64={:.1}%",
            self.iops,
            self.bw,
            self.lat_mean,
            self.lat_p99,
            self.cpu_usr,
            self.cpu_sys,
            self.iodepth_util
        )
    }
}

#[cfg(test)]
mod tests {
    use super::MetricBundle;

    #[test]
    fn test_sum_and_scale() {
        let mut sum = MetricBundle::default();
        sum += &MetricBundle {
            iops: 100.0,
            bw: 0.5,
            lat_mean: 1.0,
            lat_p99: 4.0,
            cpu_usr: 10.0,
            cpu_sys: 20.0,
            iodepth_util: 90.0,
        };
        sum += &MetricBundle {
            iops: 300.0,
            bw: 1.5,
            lat_mean: 3.0,
            lat_p99: 8.0,
            cpu_usr: 30.0,
            cpu_sys: 40.0,
            iodepth_util: 100.0,
        };
        sum /= 2u32;

        assert_eq!(sum.iops, 200.0);
        assert_eq!(sum.bw, 1.0);
        assert_eq!(sum.lat_mean, 2.0);
        assert_eq!(sum.lat_p99, 6.0);
        assert_eq!(sum.cpu_usr, 20.0);
        assert_eq!(sum.cpu_sys, 30.0);
        assert_eq!(sum.iodepth_util, 95.0);
    }

    #[test]
    fn test_display() {
        let b = MetricBundle::with_iops(1234.0);
        assert!(format!("{}", b).starts_with("iops=1234.0 bw=0.0MB/s"));
    }
}
