//! Statements, ranges, tensors, and iteration variables.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::buffer::Buffer;
use crate::expr::{PrimExpr, Var};
use crate::{NodeId, next_node_id};

/// Producer identity key: a named value produced by one operation.
///
/// Values flow through producer-load and producer-store nodes keyed by
/// `Tensor`. Equality and hashing follow the node id, so a tensor can serve
/// as a map key across analysis stages.
#[derive(Debug)]
pub struct TensorNode {
    id: NodeId,
    name: String,
    dtype: DType,
}

pub type Tensor = Rc<TensorNode>;

impl TensorNode {
    pub fn new(name: impl Into<String>, dtype: DType) -> Tensor {
        Rc::new(Self { id: next_node_id(), name: name.into(), dtype })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

impl PartialEq for TensorNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TensorNode {}

impl Hash for TensorNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Half-open interval `[min, min + extent)`.
#[derive(Debug, Clone)]
pub struct Range {
    pub min: PrimExpr,
    pub extent: PrimExpr,
}

impl Range {
    pub fn from_min_extent(min: PrimExpr, extent: PrimExpr) -> Self {
        Self { min, extent }
    }
}

/// One range per buffer dimension.
pub type Region = Vec<Range>;

/// Iteration variable with its domain.
///
/// Thread axes use the thread name (`threadIdx.x`, ...) as the var's hint.
#[derive(Debug, Clone)]
pub struct IterVar {
    pub var: Var,
    pub dom: Range,
}

impl IterVar {
    pub fn new(var: Var, dom: Range) -> Self {
        Self { var, dom }
    }
}

/// Attribute vocabulary consumed and produced by scheduling passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    /// Authorizes the tensor-core rewrite over the attribute's body.
    PragmaTensorCore,
    /// Declares the storage scope of a realized tensor.
    RealizeScope,
    /// Binds a thread axis with a concrete extent.
    ThreadExtent,
    /// `(dim, align_factor, align_offset)` stride alignment hint.
    BufferDimAlign,
    /// Attaches a synthesized buffer view to an opaque call.
    BufferBindScope,
}

impl AttrKey {
    pub const fn name(self) -> &'static str {
        match self {
            Self::PragmaTensorCore => "pragma_tensor_core",
            Self::RealizeScope => "realize_scope",
            Self::ThreadExtent => "thread_extent",
            Self::BufferDimAlign => "buffer_dim_align",
            Self::BufferBindScope => "buffer_bind_scope",
        }
    }
}

/// Object an attribute statement refers to.
#[derive(Debug, Clone)]
pub enum AttrNode {
    Tensor(Tensor),
    IterVar(IterVar),
    /// Buffer view bound to the tensor it describes.
    BufferBind { buffer: Rc<Buffer>, tensor: Tensor },
}

/// Loop execution strategy. Preserved verbatim by rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForKind {
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
    ThreadBinding,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    AttrStmt {
        node: AttrNode,
        key: AttrKey,
        value: PrimExpr,
        body: Rc<Stmt>,
    },
    /// Brings `tensor` into existence over `bounds` for the body's extent.
    ProducerRealize {
        tensor: Tensor,
        bounds: Region,
        condition: PrimExpr,
        body: Rc<Stmt>,
    },
    ProducerStore {
        tensor: Tensor,
        value: PrimExpr,
        indices: SmallVec<[PrimExpr; 4]>,
    },
    For {
        loop_var: Var,
        min: PrimExpr,
        extent: PrimExpr,
        kind: ForKind,
        body: Rc<Stmt>,
    },
    Seq {
        stmts: Vec<Rc<Stmt>>,
    },
    Evaluate {
        value: PrimExpr,
    },
}

#[derive(Debug)]
pub struct Stmt {
    id: NodeId,
    kind: StmtKind,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Rc<Stmt> {
        Rc::new(Self { id: next_node_id(), kind })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &StmtKind {
        &self.kind
    }

    // Construction helpers

    pub fn attr(node: AttrNode, key: AttrKey, value: PrimExpr, body: Rc<Stmt>) -> Rc<Stmt> {
        Self::new(StmtKind::AttrStmt { node, key, value, body })
    }

    pub fn realize(tensor: Tensor, bounds: Region, condition: PrimExpr, body: Rc<Stmt>) -> Rc<Stmt> {
        Self::new(StmtKind::ProducerRealize { tensor, bounds, condition, body })
    }

    pub fn store(tensor: Tensor, value: PrimExpr, indices: impl IntoIterator<Item = PrimExpr>) -> Rc<Stmt> {
        Self::new(StmtKind::ProducerStore { tensor, value, indices: indices.into_iter().collect() })
    }

    pub fn for_(loop_var: Var, min: PrimExpr, extent: PrimExpr, kind: ForKind, body: Rc<Stmt>) -> Rc<Stmt> {
        Self::new(StmtKind::For { loop_var, min, extent, kind, body })
    }

    pub fn seq(stmts: Vec<Rc<Stmt>>) -> Rc<Stmt> {
        Self::new(StmtKind::Seq { stmts })
    }

    pub fn evaluate(value: PrimExpr) -> Rc<Stmt> {
        Self::new(StmtKind::Evaluate { value })
    }
}
