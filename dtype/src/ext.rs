use super::*;

/// Host element types with a known [`ScalarDType`].
pub trait HasDType {
    const DTYPE: ScalarDType;
}

macro_rules! impl_dtype_ext {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(impl HasDType for $ty { const DTYPE: ScalarDType = $dtype; })*
    };
}

impl_dtype_ext! {
    i8 => ScalarDType::Int8, u8 => ScalarDType::UInt8, i32 => ScalarDType::Int32,
    f32 => ScalarDType::Float32, f64 => ScalarDType::Float64,
}
