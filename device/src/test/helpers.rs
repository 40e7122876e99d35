//! Problem builders shared by host backend tests.

use fusetune_dtype::{ComputeType, ScalarDType};

use crate::{BiasGradient, Epilogue, HostMatmulDesc, HostMatrixLayout, HostOperands, Transpose};

/// Descriptors and operands of a batched `m x n x k` host problem.
pub struct Problem {
    pub desc: HostMatmulDesc,
    pub a: HostMatrixLayout,
    pub b: HostMatrixLayout,
    pub c: HostMatrixLayout,
    pub operands: HostOperands,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batch: usize,
    pub trans_a: bool,
    pub trans_b: bool,
}

/// Deterministic values in roughly `[-1, 1]`.
pub fn filled(len: usize, seed: usize) -> Vec<f32> {
    (0..len).map(|i| (((i * 7 + seed * 13) % 23) as f32 - 11.0) / 11.0).collect()
}

fn layout(rows: usize, cols: usize, batch: usize) -> HostMatrixLayout {
    let layout = HostMatrixLayout::new(ScalarDType::Float32, rows as u64, cols as u64, rows.max(1) as i64).unwrap();
    layout.batched(batch as i32, (rows.max(1) * cols) as i64).unwrap()
}

pub fn problem(
    m: usize,
    n: usize,
    k: usize,
    trans_a: bool,
    trans_b: bool,
    batch: usize,
    epilogue: Epilogue,
) -> Problem {
    let desc = HostMatmulDesc::new(ComputeType::Compute32F, ScalarDType::Float32)
        .with_transposes(Transpose::from_flag(trans_a), Transpose::from_flag(trans_b))
        .with_epilogue(epilogue);

    let (a_rows, a_cols) = if trans_a { (k, m) } else { (m, k) };
    let (b_rows, b_cols) = if trans_b { (n, k) } else { (k, n) };

    let mut operands = HostOperands::new(
        filled(a_rows.max(1) * a_cols * batch, 1),
        filled(b_rows.max(1) * b_cols * batch, 2),
        filled(m.max(1) * n * batch, 3),
    );
    if epilogue.has_bias() {
        operands = operands.with_bias(filled(m, 4));
    }
    match epilogue.bias_gradient() {
        Some(BiasGradient::A) => operands = operands.with_bias(vec![f32::NAN; m]),
        Some(BiasGradient::B) => operands = operands.with_bias(vec![f32::NAN; n]),
        None => {}
    }
    if epilogue.writes_aux() || epilogue.is_gradient() {
        operands = operands.with_aux(filled(m * n * batch, 5));
    }

    Problem {
        desc,
        a: layout(a_rows, a_cols, batch),
        b: layout(b_rows, b_cols, batch),
        c: layout(m, n, batch),
        operands,
        m,
        n,
        k,
        batch,
        trans_a,
        trans_b,
    }
}

/// `alpha * op(A) op(B) + beta * C` computed in `f64`, column-major, without epilogue.
pub fn reference(p: &Problem) -> Vec<f64> {
    let ops = &p.operands;
    let a_ld = if p.trans_a { p.k } else { p.m }.max(1);
    let b_ld = if p.trans_b { p.n } else { p.k }.max(1);
    let a_stride = a_ld * if p.trans_a { p.m } else { p.k };
    let b_stride = b_ld * if p.trans_b { p.k } else { p.n };
    let c_stride = p.m.max(1) * p.n;

    let mut out = vec![0.0; p.m * p.n * p.batch];
    for batch in 0..p.batch {
        for j in 0..p.n {
            for i in 0..p.m {
                let mut sum = 0.0f64;
                for l in 0..p.k {
                    let a_idx = if p.trans_a { l + i * a_ld } else { i + l * a_ld };
                    let b_idx = if p.trans_b { j + l * b_ld } else { l + j * b_ld };
                    let (a, b) = (ops.a[batch * a_stride + a_idx], ops.b[batch * b_stride + b_idx]);
                    sum += f64::from(a) * f64::from(b);
                }
                let c = f64::from(ops.c[batch * c_stride + i + j * p.m]);
                out[batch * p.m * p.n + i + j * p.m] = f64::from(ops.alpha) * sum + f64::from(ops.beta) * c;
            }
        }
    }
    out
}

pub fn assert_close(actual: &[f32], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (idx, (&got, &want)) in actual.iter().zip(expected).enumerate() {
        let tolerance = 1e-4 * want.abs().max(1.0);
        assert!((f64::from(got) - want).abs() <= tolerance, "element {idx}: got {got}, expected {want}");
    }
}

/// Sums of `op(A)` rows (`BiasGradient::A`) or `op(B)` columns (`BiasGradient::B`) over every batch.
pub fn bias_gradient_reference(p: &Problem, source: BiasGradient) -> Vec<f64> {
    let ops = &p.operands;
    let a_ld = if p.trans_a { p.k } else { p.m }.max(1);
    let b_ld = if p.trans_b { p.n } else { p.k }.max(1);
    let a_stride = a_ld * if p.trans_a { p.m } else { p.k };
    let b_stride = b_ld * if p.trans_b { p.k } else { p.n };

    let len = match source {
        BiasGradient::A => p.m,
        BiasGradient::B => p.n,
    };
    let mut out = vec![0.0; len];
    for batch in 0..p.batch {
        for (idx, sum) in out.iter_mut().enumerate() {
            for l in 0..p.k {
                let value = match source {
                    BiasGradient::A => {
                        ops.a[batch * a_stride + if p.trans_a { l + idx * a_ld } else { idx + l * a_ld }]
                    }
                    BiasGradient::B => {
                        ops.b[batch * b_stride + if p.trans_b { idx + l * b_ld } else { l + idx * b_ld }]
                    }
                };
                *sum += f64::from(value);
            }
        }
    }
    out
}
