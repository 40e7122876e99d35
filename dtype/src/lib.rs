//! Element and compute data types for fused GEMM descriptors.
//!
//! Discriminants follow the vendor library encoding so that a layout's
//! `Type` attribute can be read back as a plain integer and folded into a
//! plan fingerprint without a lookup table.

pub mod ext;


/// Element type of a matrix operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr, strum::Display)]
#[repr(u32)]
pub enum ScalarDType {
    #[strum(serialize = "f32")]
    Float32 = 0,
    #[strum(serialize = "f64")]
    Float64 = 1,
    #[strum(serialize = "f16")]
    Float16 = 2,
    #[strum(serialize = "i8")]
    Int8 = 3,
    #[strum(serialize = "u8")]
    UInt8 = 8,
    #[strum(serialize = "i32")]
    Int32 = 10,
    #[strum(serialize = "bf16")]
    BFloat16 = 14,
}

impl ScalarDType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }

    pub const fn is_int(&self) -> bool {
        !self.is_float()
    }

    /// Vendor encoding of this type.
    pub const fn code(&self) -> u32 {
        *self as u32
    }

    /// Decode a vendor type code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::from_repr(code)
    }

    /// Compute type used for accumulation when multiplying operands of this type.
    ///
    /// Double-precision operands accumulate in double precision, integer operands
    /// in 32-bit integers, everything else in single precision.
    pub const fn accumulator(&self) -> ComputeType {
        match self {
            Self::Float64 => ComputeType::Compute64F,
            Self::Int8 | Self::UInt8 | Self::Int32 => ComputeType::Compute32I,
            _ => ComputeType::Compute32F,
        }
    }

    /// Type of the `alpha`/`beta` scaling factors for operands of this type.
    pub const fn scale_type(&self) -> ScalarDType {
        match self {
            Self::Float64 => Self::Float64,
            Self::Int8 | Self::UInt8 | Self::Int32 => Self::Int32,
            _ => Self::Float32,
        }
    }
}

/// Accumulation precision of a matmul.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumIter, strum::VariantArray, strum::FromRepr, strum::Display)]
#[repr(u32)]
pub enum ComputeType {
    Compute16F = 64,
    Compute32F = 68,
    Compute64F = 70,
    Compute32I = 72,
    Compute32FFastTf32 = 77,
}

impl ComputeType {
    pub const fn code(&self) -> u32 {
        *self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::from_repr(code)
    }
}
