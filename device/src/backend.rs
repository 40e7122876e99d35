//! Backend abstraction for fused matmul libraries.
//!
//! A backend owns descriptor construction, heuristic plan enumeration,
//! execution and timing markers. The plan cache and tuner only talk to a
//! backend through this trait, so a stub implementation is enough to test
//! them without a device.

use std::fmt;

use fusetune_dtype::{ComputeType, ScalarDType};

use crate::descriptor::{LayoutDescriptor, MatmulDescriptor};
use crate::error::Result;
use crate::sync::TimingEvent;

/// Constraints passed to heuristic plan enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulPreference {
    /// Plans needing more scratch memory than this are not returned.
    pub max_workspace_bytes: usize,
}

impl MatmulPreference {
    pub fn new(max_workspace_bytes: usize) -> Self {
        Self { max_workspace_bytes }
    }
}

/// Caller-provided scratch memory for a single matmul or search.
pub trait Workspace {
    fn size_bytes(&self) -> usize;
}

impl Workspace for [u8] {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl Workspace for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

/// A matmul library able to run fused GEMM + epilogue operations.
///
/// Descriptors and events are destroyed when dropped.
///
/// # Thread Safety
///
/// Backends are shared between operator invocations running on different
/// threads; each invocation brings its own stream, operands and workspace.
pub trait MatmulBackend: Send + Sync {
    type Desc: MatmulDescriptor;
    type Layout: LayoutDescriptor;
    /// Opaque execution strategy returned by heuristic enumeration.
    type Plan: Clone + Send + Sync + fmt::Debug;
    /// Scalars and buffers an execution reads and writes.
    type Operands: ?Sized;
    type Stream: ?Sized;
    type Workspace: Workspace + ?Sized;
    type Event: TimingEvent<Stream = Self::Stream>;

    /// Backend name (for logging).
    fn name(&self) -> &str;

    /// Create an operation descriptor with no transposes and the default epilogue.
    fn create_matmul_desc(&self, compute_type: ComputeType, scale_type: ScalarDType) -> Result<Self::Desc>;

    /// Create a single-batch column-major layout.
    fn create_matrix_layout(&self, dtype: ScalarDType, rows: u64, cols: u64, ld: i64) -> Result<Self::Layout>;

    /// Enumerate up to `max_count` candidate plans, best first by the backend's heuristic.
    ///
    /// An empty list means no strategy supports this configuration.
    fn heuristic_candidates(
        &self,
        desc: &Self::Desc,
        a: &Self::Layout,
        b: &Self::Layout,
        c: &Self::Layout,
        preference: &MatmulPreference,
        max_count: usize,
    ) -> Result<Vec<Self::Plan>>;

    /// Execute `D = epilogue(alpha * op(A) op(B) + beta * C)` in place of `C`.
    ///
    /// With `plan == None` the backend picks its own default strategy.
    #[allow(clippy::too_many_arguments)]
    fn matmul(
        &self,
        desc: &Self::Desc,
        a: &Self::Layout,
        b: &Self::Layout,
        c: &Self::Layout,
        plan: Option<&Self::Plan>,
        operands: &mut Self::Operands,
        stream: &Self::Stream,
        workspace: &mut Self::Workspace,
    ) -> Result<()>;

    fn create_event(&self) -> Result<Self::Event>;
}
