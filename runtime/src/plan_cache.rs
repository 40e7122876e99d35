//! Process-wide memo of selected matmul plans.
//!
//! A [`PlanCache`] maps plan fingerprints to the plan chosen by a search.
//! Entries are never evicted. Concurrent misses on the same fingerprint may
//! both search; the last one to finish overwrites the slot, and handles
//! returned earlier stay valid.

use std::collections::HashMap;
use std::sync::Arc;

use fusetune_device::MatmulBackend;
use parking_lot::Mutex;

use crate::benchmark::MatmulCall;
use crate::config::TunerConfig;
use crate::error::Result;
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::tuner::Tuner;

/// Fingerprint-keyed cache of tuned plans.
///
/// # Thread Safety
///
/// The map lock is held only for the lookup and the final insert, never
/// while a search runs.
#[derive(Debug)]
pub struct PlanCache<P> {
    plans: Mutex<HashMap<Fingerprint, Arc<P>>>,
    config: TunerConfig,
}

impl<P> PlanCache<P> {
    /// Cache searching `search_times` repetitions per candidate with default limits.
    pub fn new(search_times: i64) -> Self {
        Self::from_config(TunerConfig { search_times, ..TunerConfig::default() })
    }

    pub fn from_config(config: TunerConfig) -> Self {
        Self { plans: Mutex::new(HashMap::new()), config }
    }

    /// Cache configured from `FUSETUNE_*` environment variables, read once here.
    pub fn from_env() -> Self {
        Self::from_config(TunerConfig::from_env())
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn search_times(&self) -> i64 {
        self.config.search_times
    }

    pub fn is_tuning_enabled(&self) -> bool {
        self.config.is_tuning_enabled()
    }

    pub fn lookup(&self, fingerprint: Fingerprint) -> Option<Arc<P>> {
        self.plans.lock().get(&fingerprint).cloned()
    }

    /// Insert or overwrite the plan for `fingerprint`.
    pub fn install(&self, fingerprint: Fingerprint, plan: P) -> Arc<P> {
        let plan = Arc::new(plan);
        self.plans.lock().insert(fingerprint, Arc::clone(&plan));
        plan
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.plans.lock().contains_key(&fingerprint)
    }

    pub fn len(&self) -> usize {
        self.plans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.lock().is_empty()
    }
}

impl<P: Clone + Send + Sync + std::fmt::Debug> PlanCache<P> {
    /// Return the tuned plan for a configuration, searching on a miss.
    ///
    /// Returns `Ok(None)` without touching the backend when tuning is
    /// disabled. On a miss the operands are overwritten by trial executions.
    /// A failed search installs nothing, so the next call searches again.
    ///
    /// # Errors
    ///
    /// Fingerprint and search errors, see [`Tuner::select`].
    #[allow(clippy::too_many_arguments)]
    pub fn get_plan<B>(
        &self,
        backend: &B,
        desc: &B::Desc,
        a: &B::Layout,
        b: &B::Layout,
        c: &B::Layout,
        operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> Result<Option<Arc<P>>>
    where
        B: MatmulBackend<Plan = P>,
    {
        if !self.is_tuning_enabled() {
            return Ok(None);
        }

        let fingerprint = fingerprint(desc, a, b, c)?;
        if let Some(plan) = self.lookup(fingerprint) {
            tracing::trace!(%fingerprint, "plan cache hit");
            return Ok(Some(plan));
        }

        tracing::debug!(search_times = self.search_times(), %fingerprint, "plan cache miss, searching");
        let call = MatmulCall::new(backend, desc, a, b, c);
        let selection = Tuner::new(&self.config).select(fingerprint, call, operands, stream, workspace)?;
        tracing::debug!(
            %fingerprint,
            winner = selection.report.winner,
            candidates = selection.report.candidates(),
            warmup_failures = selection.report.warmup_failures,
            "plan installed"
        );

        Ok(Some(self.install(fingerprint, selection.plan)))
    }
}

impl<P> Default for PlanCache<P> {
    fn default() -> Self {
        Self::from_config(TunerConfig::default())
    }
}
