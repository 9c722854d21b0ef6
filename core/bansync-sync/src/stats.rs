//! Per-run outcome counters.

use std::collections::BTreeMap;
use std::fmt;

/// Outcome of a single ban attempt during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// Banned into the source guild.
    Pulled,
    /// Failed to ban into the source guild.
    FailedPull,
    /// Banned into the target guild.
    Pushed,
    /// Failed to ban into the target guild.
    FailedPush,
}

impl Outcome {
    /// Label shown in command replies.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pulled => ":ballot_box_with_check: Pulled bans:",
            Self::FailedPull => ":stop_sign: Failed pulls:",
            Self::Pushed => ":ballot_box_with_check: Pushed bans:",
            Self::FailedPush => ":stop_sign: Failed pushes:",
        }
    }

    /// Whether this outcome is a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::FailedPull | Self::FailedPush)
    }
}

/// Counts of outcomes accumulated during one reconciliation.
///
/// Only outcomes that happened at least once are present, so an empty value
/// means there was nothing to do. Failures are always counted explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStats {
    counts: BTreeMap<Outcome, usize>,
}

impl OperationStats {
    /// Creates empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurrence of `outcome`.
    pub fn record(&mut self, outcome: Outcome) {
        *self.counts.entry(outcome).or_insert(0) += 1;
    }

    /// Count for one outcome.
    pub fn get(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    /// Whether nothing was attempted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total attempts across all outcomes.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Total failed attempts.
    pub fn failures(&self) -> usize {
        self.counts
            .iter()
            .filter(|(o, _)| o.is_failure())
            .map(|(_, n)| n)
            .sum()
    }

    /// Iterates over recorded outcomes in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (Outcome, usize)> + '_ {
        self.counts.iter().map(|(o, n)| (*o, *n))
    }
}

impl fmt::Display for OperationStats {
    /// One `label count` line per recorded outcome.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (outcome, n) in self.iter() {
            writeln!(f, "{} {}", outcome.label(), n)?;
        }
        Ok(())
    }
}
