// Copyright (c) Facebook, Inc. and its affiliates.
use chrono::prelude::*;
use std::collections::VecDeque;
use vf_intf::HistoryEntry;

/// Bounded FIFO of per-source average iops, one entry per tick which
/// carried signal.
#[derive(Debug)]
pub struct HistoryBuffer {
    cap: usize,
    ring: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            ring: VecDeque::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Record `avg_iops` if any of this tick's freshly read iops in
    /// `signal_iops` is non-zero. Returns whether an entry was appended.
    pub fn maybe_append(
        &mut self,
        at: DateTime<Local>,
        signal_iops: &[f64],
        avg_iops: &[f64],
    ) -> bool {
        if !signal_iops.iter().any(|v| *v > 0.0) {
            return false;
        }

        self.ring.push_back(HistoryEntry {
            at,
            avg_iops: avg_iops.to_vec(),
        });
        while self.ring.len() > self.cap {
            self.ring.pop_front();
        }
        true
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.ring.iter().cloned().collect()
    }
}
