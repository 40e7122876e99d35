use fusetune_dtype::{ComputeType, ScalarDType};

use crate::descriptor::{LayoutAttr, LayoutDescriptor, MatmulAttr, MatmulDescriptor, Transpose};
use crate::epilogue::Epilogue;
use crate::error::{InvalidAttributeSnafu, Result};

/// Host operation descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatmulDesc {
    compute_type: ComputeType,
    scale_type: ScalarDType,
    trans_a: Transpose,
    trans_b: Transpose,
    epilogue: Epilogue,
}

impl HostMatmulDesc {
    pub fn new(compute_type: ComputeType, scale_type: ScalarDType) -> Self {
        Self {
            compute_type,
            scale_type,
            trans_a: Transpose::None,
            trans_b: Transpose::None,
            epilogue: Epilogue::Default,
        }
    }

    pub fn with_transposes(mut self, trans_a: Transpose, trans_b: Transpose) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    pub fn with_epilogue(mut self, epilogue: Epilogue) -> Self {
        self.epilogue = epilogue;
        self
    }
}

impl MatmulDescriptor for HostMatmulDesc {
    fn get_attribute(&self, attr: MatmulAttr) -> Result<i64> {
        Ok(match attr {
            MatmulAttr::ComputeType => i64::from(self.compute_type.code()),
            MatmulAttr::ScaleType => i64::from(self.scale_type.code()),
            MatmulAttr::TransA => self.trans_a as i64,
            MatmulAttr::TransB => self.trans_b as i64,
            MatmulAttr::Epilogue => i64::from(self.epilogue.code()),
        })
    }

    fn set_attribute(&mut self, attr: MatmulAttr, value: i64) -> Result<()> {
        let invalid = || InvalidAttributeSnafu { attribute: <&'static str>::from(attr), value }.build();
        let code = || u32::try_from(value).ok();
        match attr {
            MatmulAttr::ComputeType => {
                self.compute_type = code().and_then(ComputeType::from_code).ok_or_else(invalid)?;
            }
            MatmulAttr::ScaleType => {
                self.scale_type = code().and_then(ScalarDType::from_code).ok_or_else(invalid)?;
            }
            MatmulAttr::TransA => self.trans_a = Transpose::from_repr(value).ok_or_else(invalid)?,
            MatmulAttr::TransB => self.trans_b = Transpose::from_repr(value).ok_or_else(invalid)?,
            MatmulAttr::Epilogue => self.epilogue = code().and_then(Epilogue::from_code).ok_or_else(invalid)?,
        }
        Ok(())
    }
}

/// Host matrix layout (column-major, optionally strided-batched).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatrixLayout {
    dtype: ScalarDType,
    batch_count: i32,
    rows: u64,
    cols: u64,
    ld: i64,
    batch_offset: i64,
}

impl HostMatrixLayout {
    pub fn new(dtype: ScalarDType, rows: u64, cols: u64, ld: i64) -> Result<Self> {
        let mut layout = Self { dtype, batch_count: 1, rows, cols, ld: 1, batch_offset: 0 };
        layout.set_attribute(LayoutAttr::Ld, ld)?;
        Ok(layout)
    }

    /// Turn this layout into a strided batch of `count` matrices `offset` elements apart.
    pub fn batched(mut self, count: i32, offset: i64) -> Result<Self> {
        self.set_attribute(LayoutAttr::BatchCount, i64::from(count))?;
        self.set_attribute(LayoutAttr::StridedBatchOffset, offset)?;
        Ok(self)
    }
}

impl LayoutDescriptor for HostMatrixLayout {
    fn get_attribute(&self, attr: LayoutAttr) -> Result<i64> {
        let invalid = |value: u64| InvalidAttributeSnafu { attribute: <&'static str>::from(attr), value: value as i64 };
        Ok(match attr {
            LayoutAttr::Type => i64::from(self.dtype.code()),
            LayoutAttr::BatchCount => i64::from(self.batch_count),
            LayoutAttr::Rows => i64::try_from(self.rows).map_err(|_| invalid(self.rows).build())?,
            LayoutAttr::Cols => i64::try_from(self.cols).map_err(|_| invalid(self.cols).build())?,
            LayoutAttr::Ld => self.ld,
            LayoutAttr::StridedBatchOffset => self.batch_offset,
        })
    }

    fn set_attribute(&mut self, attr: LayoutAttr, value: i64) -> Result<()> {
        let invalid = || InvalidAttributeSnafu { attribute: <&'static str>::from(attr), value }.build();
        match attr {
            LayoutAttr::Type => {
                self.dtype = u32::try_from(value).ok().and_then(ScalarDType::from_code).ok_or_else(invalid)?;
            }
            LayoutAttr::BatchCount => {
                self.batch_count = i32::try_from(value).ok().filter(|&count| count >= 1).ok_or_else(invalid)?;
            }
            LayoutAttr::Rows => self.rows = u64::try_from(value).map_err(|_| invalid())?,
            LayoutAttr::Cols => self.cols = u64::try_from(value).map_err(|_| invalid())?,
            LayoutAttr::Ld => {
                // Leading dimension must cover a full column.
                if value < 1 || (value as u64) < self.rows {
                    return Err(invalid());
                }
                self.ld = value;
            }
            LayoutAttr::StridedBatchOffset => {
                if value < 0 {
                    return Err(invalid());
                }
                self.batch_offset = value;
            }
        }
        Ok(())
    }
}
