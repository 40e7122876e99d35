//! Host problems and reference results shared by runtime tests.

use fusetune_device::{Activation, Epilogue, HostMatmulDesc, HostMatrixLayout, HostOperands};
use fusetune_dtype::{ComputeType, ScalarDType};

/// Descriptors and operands of an unbatched column-major `m x n x k` host matmul.
pub struct HostProblem {
    pub desc: HostMatmulDesc,
    pub a: HostMatrixLayout,
    pub b: HostMatrixLayout,
    pub c: HostMatrixLayout,
    pub operands: HostOperands,
}

/// Deterministic values in roughly `[-1, 1]`.
pub fn filled(len: usize, seed: usize) -> Vec<f32> {
    (0..len).map(|i| (((i * 5 + seed * 11) % 19) as f32 - 9.0) / 9.0).collect()
}

pub fn host_problem(m: usize, n: usize, k: usize) -> HostProblem {
    let layout = |rows: usize, cols: usize| {
        HostMatrixLayout::new(ScalarDType::Float32, rows as u64, cols as u64, rows.max(1) as i64).unwrap()
    };
    HostProblem {
        desc: HostMatmulDesc::new(ComputeType::Compute32F, ScalarDType::Float32).with_epilogue(Epilogue::Default),
        a: layout(m, k),
        b: layout(k, n),
        c: layout(m, n),
        operands: HostOperands::new(filled(m * k, 1), filled(k * n, 2), vec![0.0; m * n]),
    }
}

/// Row-major `act(op(x) op(y) + bias)` computed in `f64`.
///
/// `x` is `[M, K]` (or `[K, M]` when `trans_x`), `y` is `[K, N]` (or
/// `[N, K]` when `trans_y`), `bias` has `N` elements.
#[allow(clippy::too_many_arguments)]
pub fn row_major_reference(
    x: &[f32],
    y: &[f32],
    bias: Option<&[f32]>,
    m: usize,
    n: usize,
    k: usize,
    trans_x: bool,
    trans_y: bool,
    epilogue: Epilogue,
) -> Vec<f64> {
    let x_at = |i: usize, p: usize| f64::from(if trans_x { x[p * m + i] } else { x[i * k + p] });
    let y_at = |p: usize, j: usize| f64::from(if trans_y { y[j * k + p] } else { y[p * n + j] });

    let mut out = vec![0.0; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc: f64 = (0..k).map(|p| x_at(i, p) * y_at(p, j)).sum();
            if let Some(bias) = bias {
                acc += f64::from(bias[j]);
            }
            out[i * n + j] = match epilogue.activation() {
                Activation::None => acc,
                Activation::Relu => acc.max(0.0),
                Activation::Gelu => {
                    let inner = (2.0 / std::f64::consts::PI).sqrt() * (acc + 0.044715 * acc.powi(3));
                    0.5 * acc * (1.0 + inner.tanh())
                }
            };
        }
    }
    out
}

/// Derivative of `activation` at `x`, with the tanh approximation for GELU.
fn activation_grad(activation: Activation, x: f64) -> f64 {
    match activation {
        Activation::None => 1.0,
        Activation::Relu => if x > 0.0 { 1.0 } else { 0.0 },
        Activation::Gelu => {
            let c = (2.0 / std::f64::consts::PI).sqrt();
            let tanh = (c * (x + 0.044715 * x.powi(3))).tanh();
            0.5 * (1.0 + tanh) + 0.5 * x * (1.0 - tanh * tanh) * c * (1.0 + 3.0 * 0.044715 * x * x)
        }
    }
}

/// Row-major gradients of [`row_major_reference`], computed in `f64`.
pub struct BackwardReference {
    /// Stored like `x`, scaled by the activation derivative at `aux`.
    pub dx: Vec<f64>,
    /// Stored like `y`.
    pub dy: Vec<f64>,
    pub dbias: Vec<f64>,
}

#[allow(clippy::too_many_arguments)]
pub fn row_major_backward_reference(
    dout: &[f32],
    x: &[f32],
    y: &[f32],
    aux: Option<&[f32]>,
    m: usize,
    n: usize,
    k: usize,
    trans_x: bool,
    trans_y: bool,
    activation: Activation,
) -> BackwardReference {
    let x_index = |i: usize, p: usize| if trans_x { p * m + i } else { i * k + p };
    let y_index = |p: usize, j: usize| if trans_y { j * k + p } else { p * n + j };
    let dout_at = |i: usize, j: usize| f64::from(dout[i * n + j]);

    let mut dx = vec![0.0; m * k];
    for i in 0..m {
        for p in 0..k {
            let sum: f64 = (0..n).map(|j| dout_at(i, j) * f64::from(y[y_index(p, j)])).sum();
            let pre = aux.map_or(0.0, |aux| f64::from(aux[x_index(i, p)]));
            dx[x_index(i, p)] = sum * activation_grad(activation, pre);
        }
    }

    let mut dy = vec![0.0; k * n];
    for p in 0..k {
        for j in 0..n {
            dy[y_index(p, j)] = (0..m).map(|i| f64::from(x[x_index(i, p)]) * dout_at(i, j)).sum();
        }
    }

    let dbias = (0..n).map(|j| (0..m).map(|i| dout_at(i, j)).sum()).collect();
    BackwardReference { dx, dy, dbias }
}

#[track_caller]
pub fn assert_close(actual: &[f32], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (index, (&got, &want)) in actual.iter().zip(expected).enumerate() {
        let diff = (f64::from(got) - want).abs();
        assert!(diff <= tolerance * (1.0 + want.abs()), "element {index}: got {got}, want {want}");
    }
}
