
/// Scalar element type carried by every IR expression.
///
/// Sub-byte types (`Int1`, `Int4`, `UInt4`) exist because tensor-core input
/// fragments are allowed to be narrower than a byte; they report their exact
/// width through [`DType::bits`] and round up in [`DType::bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
pub enum DType {
    Bool = 0,

    Int1 = 1,
    Int4 = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,

    UInt4 = 7,
    UInt8 = 8,
    UInt16 = 9,
    UInt32 = 10,
    UInt64 = 11,

    Float16 = 12,
    BFloat16 = 13,
    Float32 = 14,
    Float64 = 15,

    /// Opaque pointer; the result type of intrinsic calls.
    Handle = 16,
    /// No data; metadata-only nodes.
    Void = 17,
}

impl DType {
    pub const fn bits(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int1 => 1,
            Self::Int4 => 4,
            Self::Int8 => 8,
            Self::Int16 => 16,
            Self::Int32 => 32,
            Self::Int64 => 64,
            Self::UInt4 => 4,
            Self::UInt8 => 8,
            Self::UInt16 => 16,
            Self::UInt32 => 32,
            Self::UInt64 => 64,
            Self::Float16 => 16,
            Self::BFloat16 => 16,
            Self::Float32 => 32,
            Self::Float64 => 64,
            Self::Handle => 64,
            Self::Void => 0,
        }
    }

    /// Storage size rounded up to whole bytes.
    pub const fn bytes(&self) -> usize {
        self.bits().div_ceil(8)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int1 | Self::Int4 | Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt4 | Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_integer(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }
}
