use fusetune_dtype::{ComputeType, ScalarDType};
use tracing::trace;

use super::descriptor::{HostMatmulDesc, HostMatrixLayout};
use super::kernel::{self, GemmProblem};
use super::{HostOperands, HostStream, HostWorkspace};
use crate::backend::{MatmulBackend, MatmulPreference};
use crate::error::{Error, Result};
use crate::sync::HostEvent;

/// Loop schedule of a host matmul.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostAlgo {
    /// Dot product per output element.
    Naive,
    /// Column-at-a-time axpy over `op(A)` columns.
    RowStream,
    /// Cache-blocked axpy with square tiles.
    Tiled { tile: usize },
    /// Copies `tile` columns of `op(B)` into the workspace before streaming them.
    PackedB { tile: usize },
}

impl HostAlgo {
    /// Scratch memory this schedule needs for a reduction depth of `k`.
    pub fn workspace_bytes(&self, k: usize) -> usize {
        match self {
            Self::PackedB { tile } => tile.saturating_mul(k).saturating_mul(size_of::<f32>()),
            _ => 0,
        }
    }
}

/// Schedules tried for small problems, best guess first.
const SMALL_PROBLEM_ORDER: [HostAlgo; 7] = [
    HostAlgo::RowStream,
    HostAlgo::Naive,
    HostAlgo::Tiled { tile: 16 },
    HostAlgo::PackedB { tile: 32 },
    HostAlgo::Tiled { tile: 32 },
    HostAlgo::PackedB { tile: 64 },
    HostAlgo::Tiled { tile: 64 },
];

/// Schedules tried for problems that do not fit in L1.
const LARGE_PROBLEM_ORDER: [HostAlgo; 7] = [
    HostAlgo::PackedB { tile: 64 },
    HostAlgo::Tiled { tile: 64 },
    HostAlgo::PackedB { tile: 32 },
    HostAlgo::Tiled { tile: 32 },
    HostAlgo::Tiled { tile: 16 },
    HostAlgo::RowStream,
    HostAlgo::Naive,
];

const SMALL_PROBLEM_VOLUME: usize = 32 * 32 * 32;

/// CPU backend executing `f32` fused matmuls.
#[derive(Debug, Clone, Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        Self
    }

    fn ranked(problem: &GemmProblem) -> &'static [HostAlgo] {
        if problem.volume() <= SMALL_PROBLEM_VOLUME { &SMALL_PROBLEM_ORDER } else { &LARGE_PROBLEM_ORDER }
    }
}

impl MatmulBackend for HostBackend {
    type Desc = HostMatmulDesc;
    type Layout = HostMatrixLayout;
    type Plan = HostAlgo;
    type Operands = HostOperands;
    type Stream = HostStream;
    type Workspace = HostWorkspace;
    type Event = HostEvent;

    fn name(&self) -> &str {
        "host"
    }

    fn create_matmul_desc(&self, compute_type: ComputeType, scale_type: ScalarDType) -> Result<HostMatmulDesc> {
        Ok(HostMatmulDesc::new(compute_type, scale_type))
    }

    fn create_matrix_layout(&self, dtype: ScalarDType, rows: u64, cols: u64, ld: i64) -> Result<HostMatrixLayout> {
        HostMatrixLayout::new(dtype, rows, cols, ld)
    }

    fn heuristic_candidates(
        &self,
        desc: &HostMatmulDesc,
        a: &HostMatrixLayout,
        b: &HostMatrixLayout,
        c: &HostMatrixLayout,
        preference: &MatmulPreference,
        max_count: usize,
    ) -> Result<Vec<HostAlgo>> {
        let problem = match GemmProblem::from_descriptors(desc, a, b, c) {
            Ok(problem) => problem,
            Err(Error::UnsupportedDType { dtype, .. }) => {
                trace!(%dtype, "host backend has no plans for this element type");
                return Ok(Vec::new());
            }
            Err(Error::UnsupportedComputeType { compute_type, .. }) => {
                trace!(%compute_type, "host backend has no plans for this compute type");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let candidates: Vec<HostAlgo> = Self::ranked(&problem)
            .iter()
            .copied()
            .filter(|algo| algo.workspace_bytes(problem.k) <= preference.max_workspace_bytes)
            .take(max_count)
            .collect();

        trace!(
            m = problem.m,
            n = problem.n,
            k = problem.k,
            batch = problem.batch,
            count = candidates.len(),
            "host heuristic candidates"
        );
        Ok(candidates)
    }

    fn matmul(
        &self,
        desc: &HostMatmulDesc,
        a: &HostMatrixLayout,
        b: &HostMatrixLayout,
        c: &HostMatrixLayout,
        plan: Option<&HostAlgo>,
        operands: &mut HostOperands,
        stream: &HostStream,
        workspace: &mut HostWorkspace,
    ) -> Result<()> {
        let problem = GemmProblem::from_descriptors(desc, a, b, c)?;
        // Untuned path: the heuristic's first choice that needs no scratch.
        let algo = match plan {
            Some(algo) => *algo,
            None => Self::ranked(&problem)
                .iter()
                .copied()
                .find(|algo| algo.workspace_bytes(problem.k) == 0)
                .unwrap_or(HostAlgo::Naive),
        };
        trace!(stream = stream.id(), ?algo, epilogue = %problem.epilogue, "host matmul");
        kernel::run(&problem, algo, operands, workspace.as_mut_slice())
    }

    fn create_event(&self) -> Result<HostEvent> {
        Ok(HostEvent::new())
    }
}
