// src/engine/policy.rs

//! Consecutive-failure budgets.

use std::fmt;

use crate::config::LoopSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    FullBuild,
    IncrementalBuild,
    Application,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::FullBuild => "build",
            FailureKind::IncrementalBuild => "incremental build",
            FailureKind::Application => "application",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Still within budget; keep going.
    Retry { failures: u32, max: u32 },
    /// More consecutive failures than allowed.
    Exhausted { failures: u32, max: u32 },
}

impl Verdict {
    pub fn is_exhausted(self) -> bool {
        matches!(self, Verdict::Exhausted { .. })
    }
}

/// Counts consecutive failures per kind against a maximum.
///
/// A budget of `n` tolerates `n` consecutive failures; the next one is
/// [`Verdict::Exhausted`]. A success resets the count for its kind only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePolicy {
    max_full: u32,
    max_incremental: u32,
    max_app: u32,
    full: u32,
    incremental: u32,
    app: u32,
}

impl FailurePolicy {
    pub fn new(max_full: u32, max_incremental: u32, max_app: u32) -> Self {
        Self {
            max_full,
            max_incremental,
            max_app,
            full: 0,
            incremental: 0,
            app: 0,
        }
    }

    pub fn from_config(cfg: &LoopSection) -> Self {
        Self::new(
            cfg.max_build_failures,
            cfg.max_incremental_failures,
            cfg.max_app_failures,
        )
    }

    pub fn failures(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::FullBuild => self.full,
            FailureKind::IncrementalBuild => self.incremental,
            FailureKind::Application => self.app,
        }
    }

    pub fn max(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::FullBuild => self.max_full,
            FailureKind::IncrementalBuild => self.max_incremental,
            FailureKind::Application => self.max_app,
        }
    }

    pub fn record_failure(&mut self, kind: FailureKind) -> Verdict {
        let max = self.max(kind);
        let counter = self.counter(kind);
        *counter = counter.saturating_add(1);
        let failures = *counter;
        if failures > max {
            Verdict::Exhausted { failures, max }
        } else {
            Verdict::Retry { failures, max }
        }
    }

    pub fn record_success(&mut self, kind: FailureKind) {
        *self.counter(kind) = 0;
    }

    fn counter(&mut self, kind: FailureKind) -> &mut u32 {
        match kind {
            FailureKind::FullBuild => &mut self.full,
            FailureKind::IncrementalBuild => &mut self.incremental,
            FailureKind::Application => &mut self.app,
        }
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::from_config(&LoopSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn budget_tolerates_max_then_exhausts() {
        let mut policy = FailurePolicy::new(2, 10, 3);
        assert_eq!(
            policy.record_failure(FailureKind::FullBuild),
            Verdict::Retry { failures: 1, max: 2 }
        );
        assert!(!policy.record_failure(FailureKind::FullBuild).is_exhausted());
        assert!(policy.record_failure(FailureKind::FullBuild).is_exhausted());
    }

    #[test]
    fn success_resets_only_its_kind() {
        let mut policy = FailurePolicy::default();
        policy.record_failure(FailureKind::IncrementalBuild);
        policy.record_failure(FailureKind::Application);
        policy.record_success(FailureKind::IncrementalBuild);
        assert_eq!(policy.failures(FailureKind::IncrementalBuild), 0);
        assert_eq!(policy.failures(FailureKind::Application), 1);
    }

    proptest! {
        #[test]
        fn exhausted_exactly_when_count_exceeds_max(max in 1u32..8, n in 1u32..20) {
            let mut policy = FailurePolicy::new(max, max, max);
            let mut last = None;
            for _ in 0..n {
                last = Some(policy.record_failure(FailureKind::Application));
            }
            prop_assert_eq!(last.map(Verdict::is_exhausted), Some(n > max));
        }
    }
}
