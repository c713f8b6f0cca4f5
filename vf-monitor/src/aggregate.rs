// Copyright (c) Facebook, Inc. and its affiliates.
use vf_intf::{Freshness, GatingPolicy, MetricBundle, ZeroPolicy};
use vf_util::*;

/// `num / den`, 0 when `den` is 0.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Percentage share of each value in the sum, all 0 if the sum is 0.
pub fn shares(vals: &[f64]) -> Vec<f64> {
    let sum: f64 = vals.iter().sum();
    vals.iter()
        .map(|v| if sum > 0.0 { safe_div(*v * TO_PCT, sum) } else { 0.0 })
        .collect()
}

/// Per-source input of one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub bundle: MetricBundle,
    pub freshness: Freshness,
    /// The read succeeded but reported zero iops.
    pub fresh_zero: bool,
}

#[derive(Debug, Clone, Default)]
struct Totals {
    sum: MetricBundle,
    count: u64,
}

impl Totals {
    fn average(&self) -> MetricBundle {
        if self.count == 0 {
            return Default::default();
        }
        let mut avg = self.sum;
        avg /= self.count as f64;
        avg
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub counted: bool,
    pub averages: Vec<MetricBundle>,
    pub counts: Vec<u64>,
    pub shares: Vec<f64>,
}

#[derive(Debug)]
pub struct Aggregator {
    gating: GatingPolicy,
    zero: ZeroPolicy,
    totals: Vec<Totals>,
    nr_counted: u64,
}

impl Aggregator {
    pub fn new(nr_sources: usize, gating: GatingPolicy, zero: ZeroPolicy) -> Self {
        Self {
            gating,
            zero,
            totals: vec![Default::default(); nr_sources],
            nr_counted: 0,
        }
    }

    /// Number of ticks counted so far.
    pub fn nr_counted(&self) -> u64 {
        self.nr_counted
    }

    fn tick_counts(&self, inputs: &[TickInput]) -> bool {
        match self.gating {
            GatingPolicy::AnyValid => inputs.iter().any(|inp| inp.freshness.is_usable()),
            GatingPolicy::AllValid => inputs.iter().all(|inp| inp.freshness.is_usable()),
        }
    }

    fn source_counts(zero: ZeroPolicy, inp: &TickInput) -> bool {
        inp.freshness.is_usable() && !(inp.fresh_zero && zero == ZeroPolicy::Exclude)
    }

    pub fn update(&mut self, inputs: &[TickInput]) -> AggregateOutput {
        debug_assert_eq!(inputs.len(), self.totals.len());

        let counted = self.tick_counts(inputs);
        if counted {
            self.nr_counted += 1;
            for (inp, totals) in inputs.iter().zip(self.totals.iter_mut()) {
                if Self::source_counts(self.zero, inp) {
                    totals.sum += &inp.bundle;
                    totals.count += 1;
                }
            }
        }

        let averages: Vec<MetricBundle> = self.totals.iter().map(|t| t.average()).collect();
        let avg_iops: Vec<f64> = averages.iter().map(|b| b.iops).collect();

        AggregateOutput {
            counted,
            counts: self.totals.iter().map(|t| t.count).collect(),
            shares: shares(&avg_iops),
            averages,
        }
    }
}
