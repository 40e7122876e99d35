//! Plan selection and caching for fused GEMM + epilogue operations.
//!
//! Picks, benchmarks and memoizes the fastest matmul plan offered by a
//! [`MatmulBackend`](fusetune_device::MatmulBackend) for a given operation
//! configuration.
//!
//! # Flow
//!
//! A caller asks a [`PlanCache`] for a plan. The descriptors are reduced to a
//! [`Fingerprint`]; on a hit the stored plan is returned, on a miss the
//! [`Tuner`] enumerates the backend's heuristic candidates, warms up, times
//! each candidate with device events and installs the fastest one.
//!
//! # Concurrency
//!
//! A cache is shared by reference between threads. Its lock only guards the
//! map, never a search; concurrent misses on one fingerprint may both search
//! and the last result wins.

pub mod benchmark;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod fused;
pub mod plan_cache;
pub mod tuner;


pub use benchmark::{EventPair, MatmulCall, Score, score_candidate};
pub use config::TunerConfig;
pub use error::*;
pub use fingerprint::{Fingerprint, FingerprintBuilder, fingerprint};
pub use fused::{FusedGemmEpilogue, FusedGemmEpilogueGrad, GemmDescriptors, GradPlans};
pub use plan_cache::PlanCache;
pub use tuner::{Selection, Tuner, TuningReport};
