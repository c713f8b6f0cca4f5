// Copyright (c) Facebook, Inc. and its affiliates.
use vf_intf::{Freshness, MetricBundle};

use super::reader::RawReadResult;

/// Last known good bundle of each source. A source's entry only ever moves
/// forward to a newer positive iops reading.
#[derive(Debug, Default)]
pub struct StalenessCache {
    last_good: Vec<Option<MetricBundle>>,
}

impl StalenessCache {
    pub fn new(nr_sources: usize) -> Self {
        Self {
            last_good: vec![None; nr_sources],
        }
    }

    /// The bundle in effect for `idx` given this tick's read, and where it
    /// came from.
    pub fn get_or_fallback(
        &mut self,
        idx: usize,
        raw: &RawReadResult,
    ) -> (MetricBundle, Freshness) {
        match raw {
            RawReadResult::Valid(bundle) => {
                if bundle.iops > 0.0 {
                    self.last_good[idx] = Some(*bundle);
                }
                (*bundle, Freshness::Fresh)
            }
            RawReadResult::ZeroIops(bundle) => (*bundle, Freshness::Fresh),
            RawReadResult::Missing | RawReadResult::Empty | RawReadResult::Malformed(_) => {
                match self.last_good[idx] {
                    Some(bundle) => (bundle, Freshness::Stale),
                    None => (Default::default(), Freshness::Unavailable),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback() {
        let mut cache = StalenessCache::new(2);
        assert_eq!(
            cache.get_or_fallback(0, &RawReadResult::Missing),
            (MetricBundle::default(), Freshness::Unavailable)
        );
        assert!(cache.last_good[0].is_none());

        let good = MetricBundle {
            iops: 120.0,
            bw: 0.5,
            ..Default::default()
        };
        assert_eq!(
            cache.get_or_fallback(0, &RawReadResult::Valid(good)),
            (good, Freshness::Fresh)
        );
        assert!(cache.last_good[0].is_some());
        assert!(cache.last_good[1].is_none());

        for raw in &[
            RawReadResult::Missing,
            RawReadResult::Empty,
            RawReadResult::Malformed("truncated".into()),
        ] {
            assert_eq!(cache.get_or_fallback(0, raw), (good, Freshness::Stale));
        }
    }

    #[test]
    fn test_zero_never_overwrites() {
        let mut cache = StalenessCache::new(1);
        let good = MetricBundle::with_iops(300.0);
        cache.get_or_fallback(0, &RawReadResult::Valid(good));

        let zero = MetricBundle {
            cpu_usr: 1.0,
            ..Default::default()
        };
        assert_eq!(
            cache.get_or_fallback(0, &RawReadResult::ZeroIops(zero)),
            (zero, Freshness::Fresh)
        );
        assert_eq!(cache.last_good[0], Some(good));
        assert_eq!(
            cache.get_or_fallback(0, &RawReadResult::Empty),
            (good, Freshness::Stale)
        );

        let newer = MetricBundle::with_iops(450.0);
        cache.get_or_fallback(0, &RawReadResult::Valid(newer));
        assert_eq!(cache.last_good[0], Some(newer));
    }
}
