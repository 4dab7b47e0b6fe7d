//! Transition run metrics.
//!
//! Every run records one [`PhaseMetrics`] per pipeline phase it reached. The
//! CLI report prints them; tests use the hook counts to check what ran.
//!
//! - Phases that were never reached (because the transition was rejected
//!   earlier) are absent, not zeroed.
//! - Durations include time spent awaiting hook and resolve futures.

use std::time::Duration;

use super::hooks::HookKind;

#[derive(Debug, Default, Clone)]
pub struct TransitionMetrics {
    /// Elapsed time from the start of `run` to settlement.
    pub total: Duration,
    /// Phases in execution order.
    pub phases: Vec<PhaseMetrics>,
}

impl TransitionMetrics {
    pub fn phase(&self, kind: HookKind) -> Option<&PhaseMetrics> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    /// Hooks invoked across every phase.
    pub fn hooks_run(&self) -> usize {
        self.phases.iter().map(|p| p.hooks_run).sum()
    }

    pub(crate) fn record(&mut self, phase: PhaseMetrics) {
        match self.phases.iter_mut().find(|p| p.kind == phase.kind) {
            Some(existing) => {
                existing.duration += phase.duration;
                existing.hooks_run += phase.hooks_run;
                existing.resolved += phase.resolved;
            }
            None => self.phases.push(phase),
        }
    }
}

/// Timing and counts for one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMetrics {
    pub kind: HookKind,
    pub duration: Duration,
    /// Hooks (registered and state-declared) that were invoked.
    pub hooks_run: usize,
    /// Resolvables requested by the phase's resolve step.
    pub resolved: usize,
}

impl PhaseMetrics {
    pub(crate) fn new(kind: HookKind) -> Self {
        PhaseMetrics { kind, duration: Duration::ZERO, hooks_run: 0, resolved: 0 }
    }
}
