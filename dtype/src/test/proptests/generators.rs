use crate::*;
use proptest::prelude::*;

pub fn int_dtype() -> impl Strategy<Value = ScalarDType> {
    prop_oneof![Just(ScalarDType::Int8), Just(ScalarDType::UInt8), Just(ScalarDType::Int32)]
}

pub fn float_dtype() -> impl Strategy<Value = ScalarDType> {
    prop_oneof![
        Just(ScalarDType::Float16),
        Just(ScalarDType::BFloat16),
        Just(ScalarDType::Float32),
        Just(ScalarDType::Float64)
    ]
}

pub fn scalar_dtype() -> impl Strategy<Value = ScalarDType> {
    prop_oneof![int_dtype(), float_dtype()]
}
