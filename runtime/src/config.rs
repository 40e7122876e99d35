//! Tuner configuration.
//!
//! Typed configuration with a bon builder and environment variable fallbacks.

use bon::bon;

/// Default cap on the number of heuristic candidates considered per search.
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

/// Default number of discarded executions before timing starts.
pub const DEFAULT_WARMUP_ITERATIONS: usize = 100;

/// Default workspace size used by the fused forward glue (4 MiB).
pub const DEFAULT_WORKSPACE_BYTES: usize = 4 * 1024 * 1024;

/// Configuration for plan search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunerConfig {
    /// Timed repetitions per candidate. `<= 0` disables tuning.
    pub search_times: i64,
    /// Maximum number of candidates requested from the heuristic.
    pub max_candidates: usize,
    /// Warm-up executions before the timed phase.
    pub warmup_iterations: usize,
    /// Scratch memory handed to the backend by the fused forward glue.
    pub workspace_bytes: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            search_times: 0,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            warmup_iterations: DEFAULT_WARMUP_ITERATIONS,
            workspace_bytes: DEFAULT_WORKSPACE_BYTES,
        }
    }
}

#[bon]
impl TunerConfig {
    /// Create a tuner configuration with builder pattern.
    #[builder]
    pub fn builder(
        #[builder(default = 0)] search_times: i64,
        #[builder(default = DEFAULT_MAX_CANDIDATES)] max_candidates: usize,
        #[builder(default = DEFAULT_WARMUP_ITERATIONS)] warmup_iterations: usize,
        #[builder(default = DEFAULT_WORKSPACE_BYTES)] workspace_bytes: usize,
    ) -> Self {
        Self { search_times, max_candidates, warmup_iterations, workspace_bytes }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `FUSETUNE_SEARCH_TIMES` - Timed repetitions per candidate (default: 0, tuning disabled)
    /// * `FUSETUNE_MAX_CANDIDATES` - Heuristic candidates per search (default: 10)
    /// * `FUSETUNE_WARMUP_ITERS` - Warm-up executions (default: 100)
    /// * `FUSETUNE_WORKSPACE_BYTES` - Workspace for fused forward calls (default: 4 MiB)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let search_times = lookup("FUSETUNE_SEARCH_TIMES").and_then(|s| s.trim().parse().ok()).unwrap_or(0);
        let max_candidates =
            lookup("FUSETUNE_MAX_CANDIDATES").and_then(|s| s.trim().parse().ok()).unwrap_or(DEFAULT_MAX_CANDIDATES);
        let warmup_iterations =
            lookup("FUSETUNE_WARMUP_ITERS").and_then(|s| s.trim().parse().ok()).unwrap_or(DEFAULT_WARMUP_ITERATIONS);
        let workspace_bytes =
            lookup("FUSETUNE_WORKSPACE_BYTES").and_then(|s| s.trim().parse().ok()).unwrap_or(DEFAULT_WORKSPACE_BYTES);

        Self { search_times, max_candidates, warmup_iterations, workspace_bytes }
    }

    /// Check if plan search is enabled.
    pub fn is_tuning_enabled(&self) -> bool {
        self.search_times > 0
    }
}
