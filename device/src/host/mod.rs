//! Host (CPU) reference backend.
//!
//! Executes fused matmuls on `f32` host buffers with a handful of loop
//! schedules that play the role of a vendor library's algorithm list. It is
//! no match for a tuned BLAS, but it gives the tuner real candidates with
//! measurably different timings.

mod backend;
mod descriptor;
mod kernel;

use std::sync::atomic::{AtomicU64, Ordering};

pub use backend::{HostAlgo, HostBackend};
pub use descriptor::{HostMatmulDesc, HostMatrixLayout};
#[cfg(test)]
pub(crate) use kernel::{activate, activation_grad};

use crate::backend::Workspace;

/// In-order host stream. Work submitted to it completes before the call returns.
#[derive(Debug)]
pub struct HostStream {
    id: u64,
}

impl HostStream {
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self { id: NEXT_ID.fetch_add(1, Ordering::Relaxed) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for HostStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Host scratch memory, kept as `f32` so packed panels need no casts.
#[derive(Debug, Clone, Default)]
pub struct HostWorkspace {
    buffer: Vec<f32>,
}

impl HostWorkspace {
    /// Allocate at least `bytes` bytes of scratch.
    pub fn with_bytes(bytes: usize) -> Self {
        Self { buffer: vec![0.0; bytes.div_ceil(size_of::<f32>())] }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.buffer
    }
}

impl Workspace for HostWorkspace {
    fn size_bytes(&self) -> usize {
        self.buffer.len() * size_of::<f32>()
    }
}

/// Buffers and scaling factors of one host matmul.
///
/// `c` is read when `beta != 0` and always overwritten with the result.
/// `bias` must be present for bias epilogues; `aux` is written by auxiliary
/// forward epilogues and read by gradient epilogues. All matrices are
/// column-major, as described by their layouts; `aux` is dense with the
/// shape of `c`.
#[derive(Debug, Clone)]
pub struct HostOperands {
    pub alpha: f32,
    pub beta: f32,
    pub a: Vec<f32>,
    pub b: Vec<f32>,
    pub c: Vec<f32>,
    pub bias: Option<Vec<f32>>,
    pub aux: Option<Vec<f32>>,
}

impl HostOperands {
    /// Operands for `C = A B` with `alpha = 1`, `beta = 0`.
    pub fn new(a: Vec<f32>, b: Vec<f32>, c: Vec<f32>) -> Self {
        Self { alpha: 1.0, beta: 0.0, a, b, c, bias: None, aux: None }
    }

    pub fn with_bias(mut self, bias: Vec<f32>) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn with_aux(mut self, aux: Vec<f32>) -> Self {
        self.aux = Some(aux);
        self
    }

    pub fn with_scaling(mut self, alpha: f32, beta: f32) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }
}
