//! Error types for plan selection.
//!
//! Only configuration and no-viable-strategy failures (plus backend failures
//! of the timing primitives) cross the tuner boundary. A candidate that fails
//! to execute is handled inside the search and never surfaces here.

use snafu::Snafu;

use crate::fingerprint::Fingerprint;

/// Result type for plan selection.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Descriptor an attribute was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operand {
    #[strum(to_string = "operation")]
    Operation,
    A,
    B,
    C,
}

/// Why a search could not produce a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum NoViableReason {
    #[strum(to_string = "no candidate plans were returned")]
    NoCandidates,
    #[strum(to_string = "every candidate failed during warm-up")]
    WarmupFailed,
    #[strum(to_string = "no candidate became the incumbent")]
    NoWinner,
}

/// Errors that can occur while selecting or running a fused matmul plan.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A descriptor attribute could not be read; the descriptor is malformed.
    #[snafu(display("cannot read {attribute} of the {operand} descriptor: {source}"))]
    Configuration { operand: Operand, attribute: &'static str, source: fusetune_device::Error },

    /// The backend offers no usable strategy for this configuration.
    #[snafu(display("no viable matmul plan for fingerprint {fingerprint}: {reason}"))]
    NoViableStrategy { fingerprint: Fingerprint, reason: NoViableReason },

    /// Heuristic enumeration itself was rejected by the backend.
    #[snafu(display("heuristic plan enumeration failed: {source}"))]
    Heuristic { source: fusetune_device::Error },

    /// A timing event could not be created, recorded or read.
    #[snafu(display("timing event failed: {source}"))]
    Timing { source: fusetune_device::Error },

    /// Descriptor construction failed.
    #[snafu(display("descriptor construction failed: {source}"))]
    Descriptor { source: fusetune_device::Error },

    /// The final (tuned or default) execution failed.
    #[snafu(display("fused matmul execution failed: {source}"))]
    Execution { source: fusetune_device::Error },
}

impl Error {
    /// True for failures caused by a malformed descriptor.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Descriptor { .. })
    }

    /// True when the backend has no usable plan for the configuration.
    pub fn is_no_viable_strategy(&self) -> bool {
        matches!(self, Self::NoViableStrategy { .. })
    }
}
