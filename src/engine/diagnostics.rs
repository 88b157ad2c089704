// src/engine/diagnostics.rs

//! Per-entry error history and profiling ring.

use std::collections::VecDeque;
use std::time::Duration;

pub const ERROR_HISTORY_CAPACITY: usize = 100;
pub const PROFILE_WINDOW: usize = 60;

/// One distinct failure message seen by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
    pub occurrences: u64,
    pub first_tick: u64,
    pub last_tick: u64,
    pub panicked: bool,
}

/// Bounded failure log, de-duplicated by message.
///
/// A repeated message bumps the existing record; a new message is appended
/// and the oldest record is dropped once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, message: &str, tick: u64, panicked: bool) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.message == message) {
            existing.occurrences += 1;
            existing.last_tick = tick;
            return;
        }

        self.records.push_back(ErrorRecord {
            message: message.to_string(),
            occurrences: 1,
            first_tick: tick,
            last_tick: tick,
            panicked,
        });
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&ErrorRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of occurrences across all records.
    pub fn total(&self) -> u64 {
        self.records.iter().map(|r| r.occurrences).sum()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Fixed-size ring of invocation durations with a rolling write index.
#[derive(Debug, Clone)]
pub struct ProfileRing {
    samples: Vec<Duration>,
    next: usize,
    filled: usize,
}

/// Aggregate view over a [`ProfileRing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSummary {
    pub samples: usize,
    pub last: Option<Duration>,
    pub average: Option<Duration>,
    pub max: Option<Duration>,
}

impl ProfileRing {
    pub fn new(window: usize) -> Self {
        Self {
            samples: vec![Duration::ZERO; window.max(1)],
            next: 0,
            filled: 0,
        }
    }

    pub fn record(&mut self, sample: Duration) {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % self.samples.len();
        self.filled = (self.filled + 1).min(self.samples.len());
    }

    pub fn window(&self) -> usize {
        self.samples.len()
    }

    /// Recorded samples, oldest first.
    pub fn samples(&self) -> Vec<Duration> {
        let cap = self.samples.len();
        let start = (self.next + cap - self.filled) % cap;
        (0..self.filled)
            .map(|i| self.samples[(start + i) % cap])
            .collect()
    }

    pub fn summary(&self) -> ProfileSummary {
        let samples = self.samples();
        let last = samples.last().copied();
        let max = samples.iter().max().copied();
        let average = u32::try_from(samples.len())
            .ok()
            .filter(|&n| n > 0)
            .map(|n| samples.iter().sum::<Duration>() / n);

        ProfileSummary {
            samples: samples.len(),
            last,
            average,
            max,
        }
    }

    pub fn clear(&mut self) {
        self.next = 0;
        self.filled = 0;
    }
}
