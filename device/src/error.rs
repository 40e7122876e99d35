use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Attribute is not supported by this descriptor implementation.
    #[snafu(display("unsupported attribute: {attribute}"))]
    UnsupportedAttribute { attribute: &'static str },

    /// Attribute value is out of the accepted range.
    #[snafu(display("invalid value {value} for attribute {attribute}"))]
    InvalidAttribute { attribute: &'static str, value: i64 },

    /// Operand layouts do not describe a valid matmul.
    #[snafu(display("shape mismatch: {reason}"))]
    ShapeMismatch { reason: String },

    /// A buffer required by the configured epilogue was not supplied.
    #[snafu(display("missing operand: {name}"))]
    MissingOperand { name: &'static str },

    #[snafu(display("workspace too small: required {required} bytes, available {available}"))]
    WorkspaceTooSmall { required: usize, available: usize },

    /// Execution of a plan was rejected by the backend.
    #[snafu(display("execution failed: {reason}"))]
    ExecutionFailed { reason: String },

    /// Elapsed time was queried on an event that was never recorded.
    #[snafu(display("timing event was not recorded"))]
    EventNotRecorded,

    #[snafu(display("element type {dtype} is not supported by {backend}"))]
    UnsupportedDType { dtype: fusetune_dtype::ScalarDType, backend: &'static str },

    #[snafu(display("compute type {compute_type} is not supported by {backend}"))]
    UnsupportedComputeType { compute_type: fusetune_dtype::ComputeType, backend: &'static str },
}
