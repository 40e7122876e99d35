//! Host fused GEMM kernels.
//!
//! Every schedule first accumulates `op(A) op(B)` for one batch into a dense
//! column-major scratch matrix, then a shared finalization pass applies
//! `alpha`, `beta` and the epilogue. Schedules differ only in loop order,
//! blocking and packing, so they agree up to floating-point reassociation.

use fusetune_dtype::ComputeType;
use fusetune_dtype::ext::HasDType;
use snafu::ensure;

use super::HostOperands;
use super::backend::HostAlgo;
use crate::descriptor::{LayoutDescriptor, MatmulDescriptor};
use crate::epilogue::{Activation, BiasGradient, Epilogue};
use crate::error::{
    MissingOperandSnafu, Result, ShapeMismatchSnafu, UnsupportedComputeTypeSnafu, UnsupportedDTypeSnafu,
    WorkspaceTooSmallSnafu,
};

/// Strided view of one operand as an `rows x cols` column-major matrix.
#[derive(Debug, Clone, Copy)]
struct Operand {
    transpose: bool,
    ld: usize,
    stride: usize,
    /// Elements the buffer must hold for the whole batch.
    extent: usize,
}

impl Operand {
    #[inline(always)]
    fn at(&self, data: &[f32], batch: usize, row: usize, col: usize) -> f32 {
        let base = batch * self.stride;
        if self.transpose { data[base + col + row * self.ld] } else { data[base + row + col * self.ld] }
    }
}

/// A validated `m x n x k` problem read from descriptors.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GemmProblem {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batch: usize,
    pub epilogue: Epilogue,
    a: Operand,
    b: Operand,
    c: Operand,
}

impl GemmProblem {
    pub fn from_descriptors(
        desc: &impl MatmulDescriptor,
        a: &impl LayoutDescriptor,
        b: &impl LayoutDescriptor,
        c: &impl LayoutDescriptor,
    ) -> Result<Self> {
        for layout in [a.dtype()?, b.dtype()?, c.dtype()?] {
            ensure!(layout == f32::DTYPE, UnsupportedDTypeSnafu { dtype: layout, backend: "host" });
        }
        // Kernels accumulate in f32.
        let compute_type = desc.compute_type()?;
        ensure!(
            matches!(compute_type, ComputeType::Compute32F | ComputeType::Compute32FFastTf32),
            UnsupportedComputeTypeSnafu { compute_type, backend: "host" }
        );

        let trans_a = desc.trans_a()?.is_transposed();
        let trans_b = desc.trans_b()?.is_transposed();
        let (m, k) = if trans_a { (a.cols()?, a.rows()?) } else { (a.rows()?, a.cols()?) };
        let (k_b, n) = if trans_b { (b.cols()?, b.rows()?) } else { (b.rows()?, b.cols()?) };

        ensure!(k == k_b, ShapeMismatchSnafu { reason: format!("op(A) has {k} columns but op(B) has {k_b} rows") });
        ensure!(
            c.rows()? == m && c.cols()? == n,
            ShapeMismatchSnafu { reason: format!("C is {}x{}, expected {m}x{n}", c.rows()?, c.cols()?) }
        );

        let batch = a.batch_count()?;
        ensure!(
            b.batch_count()? == batch && c.batch_count()? == batch,
            ShapeMismatchSnafu { reason: "operands disagree on batch count".to_string() }
        );

        let operand = |layout: &dyn LayoutDescriptor, transpose: bool| -> Result<Operand> {
            let (rows, cols, ld, stride) = (layout.rows()?, layout.cols()?, layout.ld()?, layout.batch_offset()?);
            ensure!(ld >= rows.max(1), ShapeMismatchSnafu { reason: format!("leading dimension {ld} < rows {rows}") });
            let overflow = || ShapeMismatchSnafu { reason: format!("{rows}x{cols} operand overflows usize") }.build();
            let single = match cols {
                0 => 0,
                _ => ld.checked_mul(cols - 1).and_then(|v| v.checked_add(rows)).ok_or_else(overflow)?,
            };
            ensure!(
                batch == 1 || stride >= single,
                ShapeMismatchSnafu { reason: format!("batch offset {stride} overlaps a {rows}x{cols} matrix") }
            );
            let extent = (batch - 1).checked_mul(stride).and_then(|v| v.checked_add(single)).ok_or_else(overflow)?;
            Ok(Operand { transpose, ld, stride, extent })
        };

        Ok(Self {
            m,
            n,
            k,
            batch,
            epilogue: desc.epilogue()?,
            a: operand(a, trans_a)?,
            b: operand(b, trans_b)?,
            c: operand(c, false)?,
        })
    }

    /// Multiply-accumulate volume of one batch, saturating on overflow.
    pub fn volume(&self) -> usize {
        self.m.saturating_mul(self.n).saturating_mul(self.k)
    }
}

/// Run `problem` with schedule `algo`.
pub(crate) fn run(problem: &GemmProblem, algo: HostAlgo, ops: &mut HostOperands, workspace: &mut [f32]) -> Result<()> {
    validate_operands(problem, ops)?;

    let required = algo.workspace_bytes(problem.k) / size_of::<f32>();
    ensure!(
        workspace.len() >= required,
        WorkspaceTooSmallSnafu { required: required * size_of::<f32>(), available: size_of_val(workspace) }
    );

    let (m, n) = (problem.m, problem.n);
    let bias_gradient = problem.epilogue.bias_gradient();
    if bias_gradient.is_some()
        && let Some(bias) = ops.bias.as_mut()
    {
        bias.fill(0.0);
    }

    let mut acc = vec![0.0f32; m * n];
    for batch in 0..problem.batch {
        acc.fill(0.0);
        match algo {
            HostAlgo::Naive => naive(problem, ops, batch, &mut acc),
            HostAlgo::RowStream => row_stream(problem, ops, batch, &mut acc),
            HostAlgo::Tiled { tile } => tiled(problem, ops, batch, tile, &mut acc),
            HostAlgo::PackedB { tile } => packed_b(problem, ops, batch, tile, &mut workspace[..required], &mut acc),
        }
        finalize(problem, ops, batch, &acc);
        if let Some(source) = bias_gradient {
            reduce_bias(problem, source, ops, batch);
        }
    }
    Ok(())
}

fn validate_operands(problem: &GemmProblem, ops: &HostOperands) -> Result<()> {
    for (name, len, extent) in [
        ("a", ops.a.len(), problem.a.extent),
        ("b", ops.b.len(), problem.b.extent),
        ("c", ops.c.len(), problem.c.extent),
    ] {
        ensure!(len >= extent, ShapeMismatchSnafu { reason: format!("{name} holds {len} elements, needs {extent}") });
    }

    let epilogue = problem.epilogue;
    if epilogue.has_bias() {
        let bias = ops.bias.as_ref().ok_or_else(|| MissingOperandSnafu { name: "bias" }.build())?;
        ensure!(
            bias.len() >= problem.m,
            ShapeMismatchSnafu { reason: format!("bias holds {} elements, needs {}", bias.len(), problem.m) }
        );
    }
    if let Some(source) = epilogue.bias_gradient() {
        let needed = match source {
            BiasGradient::A => problem.m,
            BiasGradient::B => problem.n,
        };
        let bias = ops.bias.as_ref().ok_or_else(|| MissingOperandSnafu { name: "bias" }.build())?;
        ensure!(
            bias.len() >= needed,
            ShapeMismatchSnafu { reason: format!("bias gradient holds {} elements, needs {needed}", bias.len()) }
        );
    }
    if epilogue.writes_aux() || epilogue.is_gradient() {
        let aux = ops.aux.as_ref().ok_or_else(|| MissingOperandSnafu { name: "aux" }.build())?;
        let needed = problem.batch * problem.m * problem.n;
        ensure!(
            aux.len() >= needed,
            ShapeMismatchSnafu { reason: format!("aux holds {} elements, needs {needed}", aux.len()) }
        );
    }
    Ok(())
}

fn naive(p: &GemmProblem, ops: &HostOperands, batch: usize, acc: &mut [f32]) {
    for j in 0..p.n {
        for i in 0..p.m {
            let mut sum = 0.0;
            for l in 0..p.k {
                sum += p.a.at(&ops.a, batch, i, l) * p.b.at(&ops.b, batch, l, j);
            }
            acc[i + j * p.m] = sum;
        }
    }
}

fn row_stream(p: &GemmProblem, ops: &HostOperands, batch: usize, acc: &mut [f32]) {
    for j in 0..p.n {
        let column = &mut acc[j * p.m..(j + 1) * p.m];
        for l in 0..p.k {
            let b = p.b.at(&ops.b, batch, l, j);
            for (i, out) in column.iter_mut().enumerate() {
                *out += p.a.at(&ops.a, batch, i, l) * b;
            }
        }
    }
}

fn tiled(p: &GemmProblem, ops: &HostOperands, batch: usize, tile: usize, acc: &mut [f32]) {
    for j0 in (0..p.n).step_by(tile) {
        for l0 in (0..p.k).step_by(tile) {
            for i0 in (0..p.m).step_by(tile) {
                for j in j0..(j0 + tile).min(p.n) {
                    for l in l0..(l0 + tile).min(p.k) {
                        let b = p.b.at(&ops.b, batch, l, j);
                        for i in i0..(i0 + tile).min(p.m) {
                            acc[i + j * p.m] += p.a.at(&ops.a, batch, i, l) * b;
                        }
                    }
                }
            }
        }
    }
}

fn packed_b(p: &GemmProblem, ops: &HostOperands, batch: usize, tile: usize, panel: &mut [f32], acc: &mut [f32]) {
    for j0 in (0..p.n).step_by(tile) {
        let width = tile.min(p.n - j0);
        // Panel is k x width, column-major.
        for jj in 0..width {
            for l in 0..p.k {
                panel[l + jj * p.k] = p.b.at(&ops.b, batch, l, j0 + jj);
            }
        }
        for jj in 0..width {
            let column = &mut acc[(j0 + jj) * p.m..(j0 + jj + 1) * p.m];
            for (l, &b) in panel[jj * p.k..(jj + 1) * p.k].iter().enumerate() {
                for (i, out) in column.iter_mut().enumerate() {
                    *out += p.a.at(&ops.a, batch, i, l) * b;
                }
            }
        }
    }
}

fn finalize(p: &GemmProblem, ops: &mut HostOperands, batch: usize, acc: &[f32]) {
    let epilogue = p.epilogue;
    let activation = epilogue.activation();
    let c_base = batch * p.c.stride;
    let aux_base = batch * p.m * p.n;

    for j in 0..p.n {
        for i in 0..p.m {
            let idx = c_base + i + j * p.c.ld;
            let mut value = ops.alpha * acc[i + j * p.m];
            if ops.beta != 0.0 {
                value += ops.beta * ops.c[idx];
            }
            if let Some(bias) = ops.bias.as_ref().filter(|_| epilogue.has_bias()) {
                value += bias[i];
            }

            let aux_idx = aux_base + i + j * p.m;
            let out = if epilogue.is_gradient() {
                let pre = ops.aux.as_ref().map_or(0.0, |aux| aux[aux_idx]);
                value * activation_grad(activation, pre)
            } else {
                if epilogue.writes_aux()
                    && let Some(aux) = ops.aux.as_mut()
                {
                    aux[aux_idx] = value;
                }
                activate(activation, value)
            };
            ops.c[idx] = out;
        }
    }
}

/// Accumulate the bias gradient of one batch. Batches sum into the same buffer.
fn reduce_bias(p: &GemmProblem, source: BiasGradient, ops: &mut HostOperands, batch: usize) {
    let HostOperands { a, b, bias, .. } = ops;
    let Some(bias) = bias.as_mut() else {
        return;
    };
    let (a, b) = (a.as_slice(), b.as_slice());
    match source {
        BiasGradient::A => {
            for (i, out) in bias[..p.m].iter_mut().enumerate() {
                *out += (0..p.k).map(|l| p.a.at(a, batch, i, l)).sum::<f32>();
            }
        }
        BiasGradient::B => {
            for (j, out) in bias[..p.n].iter_mut().enumerate() {
                *out += (0..p.k).map(|l| p.b.at(b, batch, l, j)).sum::<f32>();
            }
        }
    }
}

const SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_COEFF: f32 = 0.044_715;

pub(crate) fn activate(activation: Activation, x: f32) -> f32 {
    match activation {
        Activation::None => x,
        Activation::Relu => x.max(0.0),
        Activation::Gelu => 0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x)).tanh()),
    }
}

pub(crate) fn activation_grad(activation: Activation, x: f32) -> f32 {
    match activation {
        Activation::None => 1.0,
        Activation::Relu => if x > 0.0 { 1.0 } else { 0.0 },
        Activation::Gelu => {
            let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
            let tanh = inner.tanh();
            let sech2 = 1.0 - tanh * tanh;
            0.5 * (1.0 + tanh) + 0.5 * x * sech2 * SQRT_2_OVER_PI * (1.0 + 3.0 * GELU_COEFF * x * x)
        }
    }
}
