//! Fused `matmul + bias + activation` operator and its gradient.
//!
//! Tensors are row-major, the matmul library is column-major. The operator
//! computes `out = act(op(x) op(y) + bias)` by asking the library for
//! `out^T = op(y)^T op(x)^T`, which needs no data movement: a row-major
//! matrix is its own transpose read column-major. So the library's A operand
//! is `y`, B is `x` and the output has `N` rows and `M` columns.
//!
//! The gradient runs two matmuls with the same trick, one per input. Which
//! operand goes first and which one is transposed depends on `trans_x` and
//! `trans_y`; see [`FusedGemmEpilogueGrad`].

use std::sync::Arc;

use fusetune_device::{Activation, Epilogue, HostOperands, MatmulAttr, MatmulBackend, MatmulDescriptor, Transpose};
use fusetune_dtype::ScalarDType;
use snafu::ResultExt;

use crate::benchmark::MatmulCall;
use crate::error::{DescriptorSnafu, ExecutionSnafu, Result};
use crate::plan_cache::PlanCache;

/// Column-major `(rows, cols, ld)` of one operand.
type Layout = (u64, u64, i64);

/// Shape and fusion mode of `out[M, N] = act(op(x)[M, K] op(y)[K, N] + bias[N])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusedGemmEpilogue {
    pub m: u64,
    pub n: u64,
    pub k: u64,
    /// `x` is stored as `[K, M]`.
    pub trans_x: bool,
    /// `y` is stored as `[N, K]`.
    pub trans_y: bool,
    pub dtype: ScalarDType,
    pub epilogue: Epilogue,
}

/// Library descriptors of one matmul call.
#[derive(Debug)]
pub struct GemmDescriptors<B: MatmulBackend> {
    pub desc: B::Desc,
    pub a: B::Layout,
    pub b: B::Layout,
    pub c: B::Layout,
}

impl<B: MatmulBackend> GemmDescriptors<B> {
    fn create(
        backend: &B,
        dtype: ScalarDType,
        (trans_a, trans_b): (bool, bool),
        epilogue: Epilogue,
        [a, b, c]: [Layout; 3],
    ) -> Result<Self> {
        let mut desc = backend.create_matmul_desc(dtype.accumulator(), dtype.scale_type()).context(DescriptorSnafu)?;
        desc.set_attribute(MatmulAttr::TransA, Transpose::from_flag(trans_a) as i64).context(DescriptorSnafu)?;
        desc.set_attribute(MatmulAttr::TransB, Transpose::from_flag(trans_b) as i64).context(DescriptorSnafu)?;
        desc.set_attribute(MatmulAttr::Epilogue, i64::from(epilogue.code())).context(DescriptorSnafu)?;

        let layout = |(rows, cols, ld): Layout| {
            backend.create_matrix_layout(dtype, rows, cols, ld.max(1)).context(DescriptorSnafu)
        };
        Ok(Self { desc, a: layout(a)?, b: layout(b)?, c: layout(c)? })
    }

    /// Fetch or tune a plan for these descriptors, then execute it.
    fn run(
        &self,
        cache: &PlanCache<B::Plan>,
        backend: &B,
        operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> Result<Option<Arc<B::Plan>>> {
        let Self { desc, a, b, c } = self;
        let plan = cache.get_plan(backend, desc, a, b, c, operands, stream, workspace)?;
        MatmulCall::new(backend, desc, a, b, c)
            .run(plan.as_deref(), operands, stream, workspace)
            .context(ExecutionSnafu)?;
        Ok(plan)
    }
}

fn x_layout(m: u64, k: u64, trans_x: bool) -> Layout {
    if trans_x { (m, k, m as i64) } else { (k, m, k as i64) }
}

fn y_layout(n: u64, k: u64, trans_y: bool) -> Layout {
    if trans_y { (k, n, k as i64) } else { (n, k, n as i64) }
}

impl FusedGemmEpilogue {
    pub fn new(m: u64, n: u64, k: u64, epilogue: Epilogue) -> Self {
        Self { m, n, k, trans_x: false, trans_y: false, dtype: ScalarDType::Float32, epilogue }
    }

    pub fn with_transposes(mut self, trans_x: bool, trans_y: bool) -> Self {
        self.trans_x = trans_x;
        self.trans_y = trans_y;
        self
    }

    pub fn with_dtype(mut self, dtype: ScalarDType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Column-major `(rows, cols, ld)` of `x`.
    pub fn x_layout(&self) -> (u64, u64, i64) {
        x_layout(self.m, self.k, self.trans_x)
    }

    /// Column-major `(rows, cols, ld)` of `y`.
    pub fn y_layout(&self) -> (u64, u64, i64) {
        y_layout(self.n, self.k, self.trans_y)
    }

    /// Column-major `(rows, cols, ld)` of `out`.
    pub fn out_layout(&self) -> (u64, u64, i64) {
        (self.n, self.m, self.n as i64)
    }

    /// Create the operation descriptor and the layouts of `y` (A), `x` (B) and `out` (C).
    pub fn descriptors<B: MatmulBackend>(&self, backend: &B) -> Result<GemmDescriptors<B>> {
        let layouts = [self.y_layout(), self.x_layout(), self.out_layout()];
        GemmDescriptors::create(backend, self.dtype, (self.trans_y, self.trans_x), self.epilogue, layouts)
    }

    /// Run the forward pass with a tuned plan, or the backend default when tuning is disabled.
    ///
    /// `operands` must already be in library order (A = `y`, B = `x`,
    /// C = `out`). Returns the plan that was used, if any.
    pub fn forward<B: MatmulBackend>(
        &self,
        cache: &PlanCache<B::Plan>,
        backend: &B,
        operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> Result<Option<Arc<B::Plan>>> {
        let descriptors = self.descriptors(backend)?;
        tracing::trace!(m = self.m, n = self.n, k = self.k, epilogue = %self.epilogue, "fused gemm epilogue forward");
        descriptors.run(cache, backend, operands, stream, workspace)
    }

    /// Host operands for row-major `x`, `y` and an optional `bias` of length `N`.
    ///
    /// The output and, for auxiliary epilogues, the pre-activation buffer are
    /// zero-initialized with `M * N` elements.
    pub fn host_operands(&self, x: Vec<f32>, y: Vec<f32>, bias: Option<Vec<f32>>) -> HostOperands {
        let len = (self.m * self.n) as usize;
        let mut operands = HostOperands::new(y, x, vec![0.0; len]);
        if let Some(bias) = bias {
            operands = operands.with_bias(bias);
        }
        if self.epilogue.writes_aux() {
            operands = operands.with_aux(vec![0.0; len]);
        }
        operands
    }
}

/// Gradient of [`FusedGemmEpilogue`] with respect to `x`, `y` and `bias`.
///
/// Given `dout[M, N]` it computes
///
/// - `dx = (dout op(y)^T) * act'(aux)`, stored like `x`, where `aux` holds
///   the pre-activation values of `x` written by the forward pass of the
///   layer that produced it;
/// - `dy = op(x)^T dout`, stored like `y`;
/// - `dbias[N]`, the column sums of `dout`, reduced by the `dy` matmul when
///   `bias_grad` is set.
///
/// The activation derivative and the bias reduction are fused into the
/// matmul epilogues. Each matmul gets its own plan from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusedGemmEpilogueGrad {
    pub m: u64,
    pub n: u64,
    pub k: u64,
    pub trans_x: bool,
    pub trans_y: bool,
    pub dtype: ScalarDType,
    /// Activation whose derivative is applied to `dx`.
    pub activation: Activation,
    pub bias_grad: bool,
    /// Accumulate into the existing `dx` instead of overwriting it.
    pub addto_dx: bool,
    /// Accumulate into the existing `dy` instead of overwriting it.
    pub addto_dy: bool,
}

/// Plans used by one backward pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradPlans<P> {
    pub dx: Option<Arc<P>>,
    pub dy: Option<Arc<P>>,
}

impl FusedGemmEpilogueGrad {
    pub fn new(m: u64, n: u64, k: u64, activation: Activation) -> Self {
        Self {
            m,
            n,
            k,
            trans_x: false,
            trans_y: false,
            dtype: ScalarDType::Float32,
            activation,
            bias_grad: true,
            addto_dx: false,
            addto_dy: false,
        }
    }

    /// Gradient of a forward operator. Only its activation is used; bias and aux flags are ignored.
    pub fn of(forward: &FusedGemmEpilogue) -> Self {
        Self::new(forward.m, forward.n, forward.k, forward.epilogue.activation())
            .with_transposes(forward.trans_x, forward.trans_y)
            .with_dtype(forward.dtype)
    }

    pub fn with_transposes(mut self, trans_x: bool, trans_y: bool) -> Self {
        self.trans_x = trans_x;
        self.trans_y = trans_y;
        self
    }

    pub fn with_dtype(mut self, dtype: ScalarDType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_bias_grad(mut self, bias_grad: bool) -> Self {
        self.bias_grad = bias_grad;
        self
    }

    pub fn with_addto(mut self, dx: bool, dy: bool) -> Self {
        self.addto_dx = dx;
        self.addto_dy = dy;
        self
    }

    /// Epilogue of the `dx` matmul.
    pub fn dx_epilogue(&self) -> Epilogue {
        match self.activation {
            Activation::None => Epilogue::Default,
            Activation::Relu => Epilogue::DRelu,
            Activation::Gelu => Epilogue::DGelu,
        }
    }

    /// Epilogue of the `dy` matmul. `dout` is A when `y` is not transposed and B otherwise.
    pub fn dy_epilogue(&self) -> Epilogue {
        match (self.bias_grad, self.trans_y) {
            (false, _) => Epilogue::Default,
            (true, false) => Epilogue::BGradA,
            (true, true) => Epilogue::BGradB,
        }
    }

    fn dout_layout(&self) -> Layout {
        (self.n, self.m, self.n as i64)
    }

    /// Descriptors of `dx`: `dout op(y)^T`, or `op(y) dout^T` when `x` is transposed.
    pub fn dx_descriptors<B: MatmulBackend>(&self, backend: &B) -> Result<GemmDescriptors<B>> {
        let (y, dout) = (y_layout(self.n, self.k, self.trans_y), self.dout_layout());
        let dx = x_layout(self.m, self.k, self.trans_x);
        let (transposes, layouts) = if self.trans_x {
            ((true, self.trans_y), [dout, y, dx])
        } else {
            ((!self.trans_y, false), [y, dout, dx])
        };
        GemmDescriptors::create(backend, self.dtype, transposes, self.dx_epilogue(), layouts)
    }

    /// Descriptors of `dy`: `op(x)^T dout`, or `dout^T op(x)` when `y` is transposed.
    pub fn dy_descriptors<B: MatmulBackend>(&self, backend: &B) -> Result<GemmDescriptors<B>> {
        let (x, dout) = (x_layout(self.m, self.k, self.trans_x), self.dout_layout());
        let dy = y_layout(self.n, self.k, self.trans_y);
        let (transposes, layouts) = if self.trans_y {
            ((self.trans_x, true), [x, dout, dy])
        } else {
            ((false, !self.trans_x), [dout, x, dy])
        };
        GemmDescriptors::create(backend, self.dtype, transposes, self.dy_epilogue(), layouts)
    }

    /// Run both gradient matmuls.
    ///
    /// `dx_operands` and `dy_operands` must be in library order, as built by
    /// [`host_operands`](Self::host_operands). A cache miss tunes on the
    /// caller's buffers, so with `addto` set the trial runs accumulate too;
    /// tune on scratch buffers first when accumulating.
    pub fn backward<B: MatmulBackend>(
        &self,
        cache: &PlanCache<B::Plan>,
        backend: &B,
        dx_operands: &mut B::Operands,
        dy_operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> Result<GradPlans<B::Plan>> {
        tracing::trace!(
            m = self.m,
            n = self.n,
            k = self.k,
            activation = %self.activation,
            bias_grad = self.bias_grad,
            "fused gemm epilogue backward"
        );
        let dx = self.dx_descriptors(backend)?.run(cache, backend, dx_operands, stream, workspace)?;
        let dy = self.dy_descriptors(backend)?.run(cache, backend, dy_operands, stream, workspace)?;
        Ok(GradPlans { dx, dy })
    }

    /// Host operands of the `dx` and `dy` matmuls for row-major `dout`, `x` and `y`.
    ///
    /// `aux` has the shape of `x` and is required unless the activation is
    /// `None`. `dx`, `dy` and `dbias` start zeroed; `beta` is 1 for the
    /// outputs with `addto` set.
    pub fn host_operands(
        &self,
        dout: Vec<f32>,
        x: Vec<f32>,
        y: Vec<f32>,
        aux: Option<Vec<f32>>,
    ) -> (HostOperands, HostOperands) {
        let (dx_len, dy_len) = ((self.m * self.k) as usize, (self.k * self.n) as usize);
        let beta = |addto: bool| if addto { 1.0 } else { 0.0 };

        let (a, b) = if self.trans_x { (dout.clone(), y) } else { (y, dout.clone()) };
        let mut dx = HostOperands::new(a, b, vec![0.0; dx_len]).with_scaling(1.0, beta(self.addto_dx));
        if let Some(aux) = aux {
            dx = dx.with_aux(aux);
        }

        let (a, b) = if self.trans_y { (x, dout) } else { (dout, x) };
        let mut dy = HostOperands::new(a, b, vec![0.0; dy_len]).with_scaling(1.0, beta(self.addto_dy));
        if self.bias_grad {
            dy = dy.with_bias(vec![0.0; self.n as usize]);
        }
        (dx, dy)
    }
}
