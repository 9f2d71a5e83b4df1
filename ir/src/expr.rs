//! Expressions of the tree IR.

use std::rc::Rc;

use smallvec::SmallVec;
use snafu::ensure;
use tessera_dtype::DType;

use crate::error::{DTypeMismatchSnafu, IndexTypeMismatchSnafu, ReducerArityMismatchSnafu, Result};
use crate::stmt::{IterVar, Tensor};
use crate::{NodeId, next_node_id};

pub type PrimExpr = Rc<Expr>;

/// Named variable.
///
/// Identity is the node id, never the name hint: two loop nests may both
/// name their induction variable `i` without aliasing. Thread axes carry
/// their canonical names (`threadIdx.x`, `threadIdx.y`) as hints.
#[derive(Debug)]
pub struct VarNode {
    id: NodeId,
    name_hint: String,
    dtype: DType,
}

pub type Var = Rc<VarNode>;

impl VarNode {
    pub fn new(name_hint: impl Into<String>, dtype: DType) -> Var {
        Rc::new(Self { id: next_node_id(), name_hint: name_hint.into(), dtype })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name_hint(&self) -> &str {
        &self.name_hint
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

/// Opaque call vocabulary understood by downstream code generation.
///
/// These calls carry fragment operations through the rest of the lowering
/// pipeline without the IR having to model their semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// Packs interleaved (index, extent) pairs for a buffer binding.
    Tuple,
    MmaSync,
    BmmaSync,
    FillFragment,
    LoadMatrixSync,
    StoreMatrixSync,
    /// First argument names the external symbol, the rest are its operands.
    CallExtern,
}

impl Intrinsic {
    /// Wire name consumed by the code generator.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tuple => "tvm_tuple",
            Self::MmaSync => "tvm_mma_sync",
            Self::BmmaSync => "tvm_bmma_sync",
            Self::FillFragment => "tvm_fill_fragment",
            Self::LoadMatrixSync => "tvm_load_matrix_sync",
            Self::StoreMatrixSync => "tvm_store_matrix_sync",
            Self::CallExtern => "call_extern",
        }
    }
}

/// Commutative reducer: result expressions over (lhs, rhs) placeholder vars.
#[derive(Debug, Clone)]
pub struct CommReducer {
    pub lhs: Vec<Var>,
    pub rhs: Vec<Var>,
    pub result: Vec<PrimExpr>,
    pub identity: Vec<PrimExpr>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Var(Var),
    IntImm(i64),
    FloatImm(f64),
    StringImm(String),
    /// Conversion to the node's dtype.
    Cast { value: PrimExpr },
    Add { a: PrimExpr, b: PrimExpr },
    Sub { a: PrimExpr, b: PrimExpr },
    Mul { a: PrimExpr, b: PrimExpr },
    FloorDiv { a: PrimExpr, b: PrimExpr },
    FloorMod { a: PrimExpr, b: PrimExpr },
    /// Value read from a producer at the given indices.
    ProducerLoad { tensor: Tensor, indices: SmallVec<[PrimExpr; 4]> },
    Call { op: Intrinsic, args: SmallVec<[PrimExpr; 4]> },
    /// Commutative reduction over the given axes.
    Reduce {
        combiner: Rc<CommReducer>,
        source: SmallVec<[PrimExpr; 2]>,
        axis: Vec<IterVar>,
        condition: Option<PrimExpr>,
    },
}

#[derive(Debug)]
pub struct Expr {
    id: NodeId,
    kind: ExprKind,
    dtype: DType,
}

impl Expr {
    pub fn new(kind: ExprKind, dtype: DType) -> PrimExpr {
        Rc::new(Self { id: next_node_id(), kind, dtype })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    // Construction helpers

    pub fn var(var: Var) -> PrimExpr {
        let dtype = var.dtype();
        Self::new(ExprKind::Var(var), dtype)
    }

    pub fn int(dtype: DType, value: i64) -> PrimExpr {
        Self::new(ExprKind::IntImm(value), dtype)
    }

    pub fn int32(value: i64) -> PrimExpr {
        Self::int(DType::Int32, value)
    }

    pub fn float(dtype: DType, value: f64) -> PrimExpr {
        Self::new(ExprKind::FloatImm(value), dtype)
    }

    pub fn float32(value: f64) -> PrimExpr {
        Self::float(DType::Float32, value)
    }

    pub fn string(value: impl Into<String>) -> PrimExpr {
        Self::new(ExprKind::StringImm(value.into()), DType::Handle)
    }

    /// Convert `value` to `dtype`.
    pub fn cast(value: PrimExpr, dtype: DType) -> PrimExpr {
        Self::new(ExprKind::Cast { value }, dtype)
    }

    /// Read from `tensor` at integer `indices`.
    pub fn producer_load(tensor: Tensor, indices: impl IntoIterator<Item = PrimExpr>) -> Result<PrimExpr> {
        let indices: SmallVec<[PrimExpr; 4]> = indices.into_iter().collect();
        for index in &indices {
            let actual = index.dtype();
            ensure!(actual.is_integer(), IndexTypeMismatchSnafu { actual });
        }
        let dtype = tensor.dtype();
        Ok(Self::new(ExprKind::ProducerLoad { tensor, indices }, dtype))
    }

    /// Opaque intrinsic call.
    pub fn call(op: Intrinsic, args: impl IntoIterator<Item = PrimExpr>, dtype: DType) -> PrimExpr {
        Self::new(ExprKind::Call { op, args: args.into_iter().collect() }, dtype)
    }

    /// Reduction of `source` over `axis` with `combiner`.
    pub fn reduce(
        combiner: Rc<CommReducer>,
        source: impl IntoIterator<Item = PrimExpr>,
        axis: Vec<IterVar>,
        condition: Option<PrimExpr>,
    ) -> Result<PrimExpr> {
        let source: SmallVec<[PrimExpr; 2]> = source.into_iter().collect();
        ensure!(
            combiner.result.len() == source.len(),
            ReducerArityMismatchSnafu { results: combiner.result.len(), sources: source.len() }
        );
        let dtype = source[0].dtype();
        Ok(Self::new(ExprKind::Reduce { combiner, source, axis, condition }, dtype))
    }

    // Structural views used by pattern matching. Each returns `None` unless
    // the node has the requested kind.

    pub fn as_var(&self) -> Option<&Var> {
        match &self.kind {
            ExprKind::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_int_imm(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::IntImm(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float_imm(&self) -> Option<f64> {
        match &self.kind {
            ExprKind::FloatImm(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_string_imm(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::StringImm(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_add(&self) -> Option<(&PrimExpr, &PrimExpr)> {
        match &self.kind {
            ExprKind::Add { a, b } => Some((a, b)),
            _ => None,
        }
    }

    pub fn as_mul(&self) -> Option<(&PrimExpr, &PrimExpr)> {
        match &self.kind {
            ExprKind::Mul { a, b } => Some((a, b)),
            _ => None,
        }
    }

    pub fn as_producer_load(&self) -> Option<(&Tensor, &[PrimExpr])> {
        match &self.kind {
            ExprKind::ProducerLoad { tensor, indices } => Some((tensor, indices)),
            _ => None,
        }
    }
}

// Binary constructors. The `try_` forms reject operand dtype disagreement;
// the plain forms are for call sites that already hold same-dtype operands.
macro_rules! binary_ops {
    ($($try_name:ident / $name:ident => $kind:ident),* $(,)?) => {
        impl Expr {
            $(
                pub fn $try_name(a: PrimExpr, b: PrimExpr) -> Result<PrimExpr> {
                    ensure!(a.dtype() == b.dtype(), DTypeMismatchSnafu { lhs: a.dtype(), rhs: b.dtype() });
                    let dtype = a.dtype();
                    Ok(Self::new(ExprKind::$kind { a, b }, dtype))
                }

                pub fn $name(a: PrimExpr, b: PrimExpr) -> PrimExpr {
                    Self::$try_name(a, b).expect(concat!(stringify!($name), ": operand dtypes must agree"))
                }
            )*
        }
    }
}

binary_ops! {
    try_add / add => Add,
    try_sub / sub => Sub,
    try_mul / mul => Mul,
    try_floordiv / floordiv => FloorDiv,
    try_floormod / floormod => FloorMod,
}
