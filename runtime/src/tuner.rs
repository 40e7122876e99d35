//! Empirical plan search.
//!
//! A search enumerates the backend's heuristic candidates, warms the device
//! up on the first candidate that executes, times every candidate over
//! `search_times` repetitions and keeps the fastest one. Candidate 0 seeds
//! the incumbent even when it is disqualified, and later candidates replace
//! it only when strictly faster, so ties resolve to the earliest
//! (heuristically best ranked) candidate. A disqualified candidate scores
//! `f32::MAX`, which any completed candidate beats.

use fusetune_device::{MatmulBackend, MatmulPreference, Workspace};
use snafu::{ResultExt, ensure};

use crate::benchmark::{EventPair, MatmulCall, Score, score_candidate};
use crate::config::TunerConfig;
use crate::error::{HeuristicSnafu, NoViableReason, NoViableStrategySnafu, Result};
use crate::fingerprint::Fingerprint;

/// Statistics of a finished search.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningReport {
    /// Index of the winning candidate in the heuristic order.
    pub winner: usize,
    /// Per-candidate timed-phase score, in heuristic order.
    pub scores: Vec<Score>,
    /// Candidates skipped because they failed during warm-up.
    pub warmup_failures: usize,
}

impl TuningReport {
    pub fn candidates(&self) -> usize {
        self.scores.len()
    }

    /// Mean time of the winner in milliseconds.
    pub fn winner_ms(&self) -> f32 {
        self.scores[self.winner].average_ms()
    }
}

/// Winning plan of a search.
#[derive(Debug, Clone)]
pub struct Selection<P> {
    pub plan: P,
    pub report: TuningReport,
}

/// Search parameters borrowed from a [`TunerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuner {
    search_times: i64,
    max_candidates: usize,
    warmup_iterations: usize,
}

impl Tuner {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            search_times: config.search_times,
            max_candidates: config.max_candidates,
            warmup_iterations: config.warmup_iterations,
        }
    }

    pub fn search_times(&self) -> i64 {
        self.search_times
    }

    /// Search for the fastest plan of `call`.
    ///
    /// Operands are overwritten by the trial executions. Timing events are
    /// released on every exit path.
    ///
    /// # Errors
    ///
    /// - [`Error::Heuristic`](crate::Error::Heuristic) if enumeration fails.
    /// - [`Error::NoViableStrategy`](crate::Error::NoViableStrategy) if there
    ///   are no candidates or all of them fail warm-up.
    /// - [`Error::Timing`](crate::Error::Timing) if an event call fails.
    #[tracing::instrument(skip_all, fields(fingerprint = %fingerprint, backend = call.backend.name()))]
    pub fn select<B: MatmulBackend>(
        &self,
        fingerprint: Fingerprint,
        call: MatmulCall<'_, B>,
        operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> Result<Selection<B::Plan>> {
        let preference = MatmulPreference::new(workspace.size_bytes());
        let candidates = call
            .backend
            .heuristic_candidates(call.desc, call.a, call.b, call.c, &preference, self.max_candidates)
            .context(HeuristicSnafu)?;
        ensure!(!candidates.is_empty(), NoViableStrategySnafu { fingerprint, reason: NoViableReason::NoCandidates });
        tracing::debug!(candidates = candidates.len(), max_workspace = preference.max_workspace_bytes, "enumerated");

        let warmup_failures = self.warm_up(fingerprint, call, &candidates, operands, stream, workspace)?;

        let events = EventPair::create(call.backend)?;
        let mut scores = Vec::with_capacity(candidates.len());
        let mut best: Option<(usize, f32)> = None;
        for (index, plan) in candidates.iter().enumerate() {
            let score = score_candidate(call, plan, &events, self.search_times, operands, stream, workspace)?;
            tracing::trace!(index, ?plan, average_ms = score.average_ms(), "candidate timed");

            // Index 0 seeds the incumbent whatever its score.
            let average_ms = score.average_ms();
            if best.is_none_or(|(_, best_ms)| average_ms < best_ms) {
                best = Some((index, average_ms));
            }
            scores.push(score);
        }

        let Some((winner, best_ms)) = best else {
            return NoViableStrategySnafu { fingerprint, reason: NoViableReason::NoWinner }.fail();
        };
        tracing::debug!(winner, best_ms, search_times = self.search_times, "selected plan");

        let plan = candidates[winner].clone();
        Ok(Selection { plan, report: TuningReport { winner, scores, warmup_failures } })
    }

    /// Run the warm-up executions, advancing past candidates that fail.
    ///
    /// Each failure restarts the iteration count on the next candidate.
    /// Returns the number of skipped candidates.
    fn warm_up<B: MatmulBackend>(
        &self,
        fingerprint: Fingerprint,
        call: MatmulCall<'_, B>,
        candidates: &[B::Plan],
        operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> Result<usize> {
        let mut index = 0;
        let mut done = 0;
        while done < self.warmup_iterations {
            let Some(plan) = candidates.get(index) else {
                return NoViableStrategySnafu { fingerprint, reason: NoViableReason::WarmupFailed }.fail();
            };
            match call.run(Some(plan), operands, stream, workspace) {
                Ok(()) => done += 1,
                Err(error) => {
                    tracing::warn!(index, ?plan, %error, "candidate failed during warm-up, skipping");
                    index += 1;
                    done = 0;
                }
            }
        }
        Ok(index)
    }
}
