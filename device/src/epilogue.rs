//! Epilogue modes applied inline after the multiply.
//!
//! Codes follow the vendor encoding: bit 0 is the plain epilogue, bit 1 ReLU,
//! bit 2 bias, bit 5 GELU, bit 7 auxiliary output (or input, for gradients),
//! bits 8 and 9 bias gradient reduced from `A` or `B`.

/// Activation applied by an epilogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Activation {
    None,
    Relu,
    Gelu,
}

/// Operand a bias-gradient epilogue reduces over the shared dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BiasGradient {
    /// `bias[i] = sum_l op(A)[i, l]`, one entry per row of `D`.
    A,
    /// `bias[j] = sum_l op(B)[l, j]`, one entry per column of `D`.
    B,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[strum(serialize_all = "snake_case")]
#[repr(u32)]
pub enum Epilogue {
    #[default]
    Default = 1,
    Relu = 2,
    Bias = 4,
    ReluBias = 6,
    Gelu = 32,
    GeluBias = 36,
    ReluAux = 130,
    ReluAuxBias = 134,
    /// ReLU gradient; reads the auxiliary buffer written by a `ReluAux*` forward.
    DRelu = 136,
    GeluAux = 160,
    GeluAuxBias = 164,
    /// GELU gradient; reads the auxiliary buffer written by a `GeluAux*` forward.
    DGelu = 192,
    /// Plain product; reduces `op(A)` into the bias buffer.
    BGradA = 256,
    /// Plain product; reduces `op(B)` into the bias buffer.
    BGradB = 512,
}

impl Epilogue {
    pub const fn code(&self) -> u32 {
        *self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::from_repr(code)
    }

    pub const fn has_bias(&self) -> bool {
        matches!(self, Self::Bias | Self::ReluBias | Self::GeluBias | Self::ReluAuxBias | Self::GeluAuxBias)
    }

    /// Forward epilogue that writes pre-activation values to the auxiliary buffer.
    pub const fn writes_aux(&self) -> bool {
        matches!(self, Self::ReluAux | Self::ReluAuxBias | Self::GeluAux | Self::GeluAuxBias)
    }

    /// Gradient epilogue that reads the auxiliary buffer.
    pub const fn is_gradient(&self) -> bool {
        matches!(self, Self::DRelu | Self::DGelu)
    }

    /// Bias-gradient epilogue that writes a reduction of one input to the bias buffer.
    pub const fn bias_gradient(&self) -> Option<BiasGradient> {
        match self {
            Self::BGradA => Some(BiasGradient::A),
            Self::BGradB => Some(BiasGradient::B),
            _ => None,
        }
    }

    pub const fn activation(&self) -> Activation {
        match self {
            Self::Default | Self::Bias | Self::BGradA | Self::BGradB => Activation::None,
            Self::Relu | Self::ReluBias | Self::ReluAux | Self::ReluAuxBias | Self::DRelu => Activation::Relu,
            Self::Gelu | Self::GeluBias | Self::GeluAux | Self::GeluAuxBias | Self::DGelu => Activation::Gelu,
        }
    }
}
