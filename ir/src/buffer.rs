//! Buffer descriptors attached to opaque intrinsic calls.

use bon::bon;
use tessera_dtype::DType;

use crate::expr::{PrimExpr, Var};

/// Memory view handed to the code generator through `buffer_bind_scope`
/// attributes: a data pointer plus the shape, strides, and element offset of
/// the region the bound call operates on.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub data: Var,
    pub name: String,
    pub scope: String,
    pub dtype: DType,
    pub shape: Vec<PrimExpr>,
    pub strides: Vec<PrimExpr>,
    pub elem_offset: PrimExpr,
    pub data_alignment: i64,
    pub offset_factor: i64,
}

#[bon]
impl Buffer {
    #[builder]
    pub fn new(
        data: Var,
        name: String,
        scope: String,
        dtype: DType,
        shape: Vec<PrimExpr>,
        strides: Vec<PrimExpr>,
        elem_offset: PrimExpr,
        #[builder(default = 1)] data_alignment: i64,
        #[builder(default = 1)] offset_factor: i64,
    ) -> Self {
        Self { data, name, scope, dtype, shape, strides, elem_offset, data_alignment, offset_factor }
    }
}
