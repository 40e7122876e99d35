//! Plan fingerprints.
//!
//! A fingerprint folds the tuning-relevant attributes of a matmul into one
//! 64-bit key. Attributes are always visited in the same order (operation
//! descriptor, then the A, B and C layouts) because the combiner is order
//! sensitive: the same values visited in a different order give a different
//! key.
//!
//! Each value is cast to `i64`, hashed with the identity integer hash and
//! folded into the running seed with
//!
//! ```text
//! seed ^= hash(value) + 0x9e3779b9 + (seed << 6) + (seed >> 2)
//! ```
//!
//! using wrapping arithmetic. Keys are stable across processes.

use std::fmt;

use fusetune_device::{LayoutAttr, LayoutDescriptor, MatmulAttr, MatmulDescriptor};
use snafu::ResultExt;

use crate::error::{ConfigurationSnafu, Operand, Result};

/// Operation descriptor attributes, in fingerprint order.
pub const MATMUL_ATTRS: [MatmulAttr; 3] = [MatmulAttr::TransA, MatmulAttr::TransB, MatmulAttr::Epilogue];

/// Layout attributes, in fingerprint order.
pub const LAYOUT_ATTRS: [LayoutAttr; 6] = [
    LayoutAttr::Type,
    LayoutAttr::BatchCount,
    LayoutAttr::Rows,
    LayoutAttr::Cols,
    LayoutAttr::Ld,
    LayoutAttr::StridedBatchOffset,
];

const GOLDEN_RATIO: u64 = 0x9e37_79b9;

/// Cache key of a matmul configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(i64);

impl Fingerprint {
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Running fingerprint state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintBuilder {
    seed: i64,
}

impl FingerprintBuilder {
    pub const fn new() -> Self {
        Self { seed: 0 }
    }

    /// Fold one attribute value into the seed.
    pub fn mix(&mut self, value: i64) -> &mut Self {
        let hashed = value as u64;
        let seed = self.seed as u64;
        let step = hashed.wrapping_add(GOLDEN_RATIO).wrapping_add(seed << 6).wrapping_add((self.seed >> 2) as u64);
        self.seed = (seed ^ step) as i64;
        self
    }

    /// Fold the transposes and epilogue of an operation descriptor.
    pub fn matmul(&mut self, desc: &(impl MatmulDescriptor + ?Sized)) -> Result<&mut Self> {
        for attr in MATMUL_ATTRS {
            let attribute = <&'static str>::from(attr);
            let value =
                desc.get_attribute(attr).context(ConfigurationSnafu { operand: Operand::Operation, attribute })?;
            self.mix(value);
        }
        Ok(self)
    }

    /// Fold the attributes of one operand layout.
    pub fn layout(&mut self, operand: Operand, layout: &(impl LayoutDescriptor + ?Sized)) -> Result<&mut Self> {
        for attr in LAYOUT_ATTRS {
            let attribute = <&'static str>::from(attr);
            let value = layout.get_attribute(attr).context(ConfigurationSnafu { operand, attribute })?;
            self.mix(value);
        }
        Ok(self)
    }

    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.seed)
    }
}

/// Fingerprint of a matmul described by `desc` over layouts `a`, `b`, `c`.
///
/// # Errors
///
/// Returns [`Error::Configuration`](crate::Error::Configuration) naming the
/// descriptor and attribute whose read failed.
pub fn fingerprint<D, L>(desc: &D, a: &L, b: &L, c: &L) -> Result<Fingerprint>
where
    D: MatmulDescriptor + ?Sized,
    L: LayoutDescriptor + ?Sized,
{
    let mut builder = FingerprintBuilder::new();
    builder.matmul(desc)?.layout(Operand::A, a)?.layout(Operand::B, b)?.layout(Operand::C, c)?;
    Ok(builder.finish())
}
