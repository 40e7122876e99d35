//! Operation and layout descriptors.
//!
//! A matmul is described by one operation descriptor (transposes, epilogue,
//! precisions) and one layout descriptor per operand. Both are attribute bags
//! in the vendor library; here they are traits so that backends keep their
//! own representation while callers (and the plan fingerprint) read them
//! through a single integer-valued interface.

use std::fmt;

use fusetune_dtype::{ComputeType, ScalarDType};

use crate::epilogue::Epilogue;
use crate::error::{InvalidAttributeSnafu, Result};

/// Attributes of an operation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::IntoStaticStr, strum::EnumIter, strum::VariantArray)]
#[strum(serialize_all = "snake_case")]
pub enum MatmulAttr {
    ComputeType,
    ScaleType,
    TransA,
    TransB,
    Epilogue,
}

/// Attributes of a matrix layout descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::IntoStaticStr, strum::EnumIter, strum::VariantArray)]
#[strum(serialize_all = "snake_case")]
pub enum LayoutAttr {
    Type,
    BatchCount,
    Rows,
    Cols,
    Ld,
    StridedBatchOffset,
}

/// Operand transpose mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::FromRepr)]
#[repr(i64)]
pub enum Transpose {
    #[default]
    #[strum(serialize = "N")]
    None = 0,
    #[strum(serialize = "T")]
    Transpose = 1,
    #[strum(serialize = "C")]
    ConjugateTranspose = 2,
}

impl Transpose {
    pub const fn from_flag(transpose: bool) -> Self {
        if transpose { Self::Transpose } else { Self::None }
    }

    pub const fn is_transposed(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Operation descriptor of a fused matmul.
///
/// Attribute values are exchanged as `i64`; enumerated attributes use their
/// vendor encoding (see [`Transpose`], [`Epilogue`], [`ComputeType`]).
pub trait MatmulDescriptor: Send + Sync + fmt::Debug {
    fn get_attribute(&self, attr: MatmulAttr) -> Result<i64>;

    fn set_attribute(&mut self, attr: MatmulAttr, value: i64) -> Result<()>;

    fn trans_a(&self) -> Result<Transpose> {
        let raw = self.get_attribute(MatmulAttr::TransA)?;
        decode(MatmulAttr::TransA.into(), raw, Transpose::from_repr)
    }

    fn trans_b(&self) -> Result<Transpose> {
        let raw = self.get_attribute(MatmulAttr::TransB)?;
        decode(MatmulAttr::TransB.into(), raw, Transpose::from_repr)
    }

    fn epilogue(&self) -> Result<Epilogue> {
        let raw = self.get_attribute(MatmulAttr::Epilogue)?;
        decode(MatmulAttr::Epilogue.into(), raw, |v| u32::try_from(v).ok().and_then(Epilogue::from_code))
    }

    fn compute_type(&self) -> Result<ComputeType> {
        let raw = self.get_attribute(MatmulAttr::ComputeType)?;
        decode(MatmulAttr::ComputeType.into(), raw, |v| u32::try_from(v).ok().and_then(ComputeType::from_code))
    }
}

/// Layout descriptor of one matmul operand (column-major).
pub trait LayoutDescriptor: Send + Sync + fmt::Debug {
    fn get_attribute(&self, attr: LayoutAttr) -> Result<i64>;

    fn set_attribute(&mut self, attr: LayoutAttr, value: i64) -> Result<()>;

    fn dtype(&self) -> Result<ScalarDType> {
        let raw = self.get_attribute(LayoutAttr::Type)?;
        decode(LayoutAttr::Type.into(), raw, |v| u32::try_from(v).ok().and_then(ScalarDType::from_code))
    }

    fn batch_count(&self) -> Result<usize> {
        self.get_attribute(LayoutAttr::BatchCount).and_then(|v| non_negative(LayoutAttr::BatchCount, v))
    }

    fn rows(&self) -> Result<usize> {
        self.get_attribute(LayoutAttr::Rows).and_then(|v| non_negative(LayoutAttr::Rows, v))
    }

    fn cols(&self) -> Result<usize> {
        self.get_attribute(LayoutAttr::Cols).and_then(|v| non_negative(LayoutAttr::Cols, v))
    }

    fn ld(&self) -> Result<usize> {
        self.get_attribute(LayoutAttr::Ld).and_then(|v| non_negative(LayoutAttr::Ld, v))
    }

    fn batch_offset(&self) -> Result<usize> {
        self.get_attribute(LayoutAttr::StridedBatchOffset).and_then(|v| non_negative(LayoutAttr::StridedBatchOffset, v))
    }
}

fn decode<T>(attribute: &'static str, raw: i64, f: impl FnOnce(i64) -> Option<T>) -> Result<T> {
    f(raw).ok_or_else(|| InvalidAttributeSnafu { attribute, value: raw }.build())
}

fn non_negative(attr: LayoutAttr, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| InvalidAttributeSnafu { attribute: <&'static str>::from(attr), value }.build())
}
