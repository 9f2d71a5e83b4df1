//! Stage 1: recognition of `C = C + cast(A) * cast(B)` stores.
//!
//! A store qualifies when C is a live local-scope buffer of 32-bit float or
//! int element type, it is also the store's own destination, and both
//! multiplicands are (optionally cast) loads from live local-scope buffers
//! of a low-precision element type. Matching is armed only after a
//! `pragma_tensor_core` attribute has been entered.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessera_dtype::DType;
use tessera_ir::stmt::{AttrKey, AttrNode};
use tessera_ir::{ExprVisitor, NodeId, PrimExpr, Stmt, StmtKind, StmtVisitor, Tensor, walk_stmt};

use super::{ExternBufferMap, unpack_cast};

/// Buffer record tracked while walking realizations.
///
/// Once `released` is set the buffer's realize extent has closed and the
/// record only exists to reject further references.
#[derive(Debug, Clone, PartialEq)]
struct BufferInfo {
    name: String,
    dtype: DType,
    external: bool,
    released: bool,
}

/// Everything later stages need from the matcher.
#[derive(Debug, Default)]
pub(crate) struct MatchSet {
    /// Buffer names known to be tensor-core fragments.
    pub frag_reg: HashSet<String>,
    /// Multiplicand load node → name of the buffer it reads.
    pub buf_name: HashMap<NodeId, String>,
    /// Matched store node → `[load_a, load_b, load_c]` operand triple.
    pub mma_sync: HashMap<NodeId, [PrimExpr; 3]>,
    /// True when at least one store matched.
    pub matched: bool,
}

pub(crate) fn run(stmt: &Rc<Stmt>, extern_buffer: &ExternBufferMap) -> MatchSet {
    let mut matcher = MmaMatcher::new(extern_buffer);
    matcher.visit_stmt(stmt);
    matcher.set
}

/// Element types accepted for the A/B fragments.
fn is_fragment_input_dtype(dtype: DType) -> bool {
    matches!(dtype, DType::Float16 | DType::Int8 | DType::UInt8 | DType::Int4 | DType::UInt4 | DType::Int1)
}

struct MmaMatcher {
    buf_map: HashMap<Tensor, BufferInfo>,
    /// Tensor id → declared storage scope, recorded at `realize_scope`.
    storage_scope: HashMap<NodeId, String>,
    tensor_core_on: bool,
    set: MatchSet,
}

impl MmaMatcher {
    fn new(extern_buffer: &ExternBufferMap) -> Self {
        let buf_map = extern_buffer
            .iter()
            .map(|(tensor, buffer)| {
                let info =
                    BufferInfo { name: buffer.name.clone(), dtype: buffer.dtype, external: true, released: false };
                (tensor.clone(), info)
            })
            .collect();
        Self { buf_map, storage_scope: HashMap::new(), tensor_core_on: false, set: MatchSet::default() }
    }

    /// The buffer behind `expr`, provided `expr` is a load from a live
    /// local-scope buffer.
    fn local_buffer(&self, expr: &PrimExpr) -> Option<BufferInfo> {
        let (tensor, _) = expr.as_producer_load()?;
        if self.storage_scope.get(&tensor.id()).map(String::as_str) != Some("local") {
            return None;
        }
        let info = self.buf_map.get(tensor)?;
        if info.released {
            return None;
        }
        Some(info.clone())
    }

    /// Match `value = load(C) + cast(load(A)) * cast(load(B))` against the
    /// store that owns `value`. Records the fragment set, the multiplicand
    /// buffer names, and the operand triple on success.
    fn match_mma_sync(&mut self, store: &Rc<Stmt>, value: &PrimExpr, store_buffer: &BufferInfo) -> bool {
        let Some((load_c, rhs)) = value.as_add() else { return false };

        let Some(buffer_c) = self.local_buffer(load_c) else { return false };
        if buffer_c != *store_buffer || !matches!(buffer_c.dtype, DType::Float32 | DType::Int32) {
            return false;
        }

        let Some(mul) = unpack_cast(rhs, buffer_c.dtype) else { return false };
        let Some((factor_a, factor_b)) = mul.as_mul().map(|(a, b)| (a.clone(), b.clone())) else {
            return false;
        };

        let Some(load_a) = unpack_cast(&factor_a, buffer_c.dtype) else { return false };
        let Some(buffer_a) = self.local_buffer(&load_a) else { return false };
        if !is_fragment_input_dtype(buffer_a.dtype) {
            return false;
        }

        let Some(load_b) = unpack_cast(&factor_b, buffer_c.dtype) else { return false };
        let Some(buffer_b) = self.local_buffer(&load_b) else { return false };
        if !is_fragment_input_dtype(buffer_b.dtype) {
            return false;
        }

        self.set.frag_reg.insert(buffer_c.name);
        self.set.frag_reg.insert(buffer_a.name.clone());
        self.set.frag_reg.insert(buffer_b.name.clone());
        self.set.buf_name.insert(load_a.id(), buffer_a.name);
        self.set.buf_name.insert(load_b.id(), buffer_b.name);
        self.set.mma_sync.insert(store.id(), [load_a, load_b, load_c.clone()]);
        true
    }
}

impl ExprVisitor for MmaMatcher {}

impl StmtVisitor for MmaMatcher {
    fn visit_stmt(&mut self, stmt: &Rc<Stmt>) {
        match stmt.kind() {
            StmtKind::AttrStmt { key: AttrKey::PragmaTensorCore, .. } => {
                self.tensor_core_on = true;
                walk_stmt(self, stmt);
            }
            StmtKind::AttrStmt { key: AttrKey::RealizeScope, node, value, body } => {
                let scope = value.as_string_imm().expect("realize_scope value must be a string");
                if let AttrNode::Tensor(tensor) = node {
                    self.storage_scope.insert(tensor.id(), scope.to_string());
                }
                self.visit_stmt(body);
            }
            StmtKind::ProducerStore { tensor, value, .. } => {
                walk_stmt(self, stmt);
                let Some(info) = self.buf_map.get(tensor).cloned() else { return };
                if info.released {
                    return;
                }
                if self.tensor_core_on && self.match_mma_sync(stmt, value, &info) {
                    self.set.matched = true;
                }
            }
            StmtKind::ProducerRealize { tensor, body, .. } => {
                if let Some(info) = self.buf_map.get(tensor) {
                    if !info.external {
                        return;
                    }
                    self.visit_stmt(body);
                } else {
                    let info = BufferInfo {
                        name: tensor.name().to_string(),
                        dtype: tensor.dtype(),
                        external: false,
                        released: false,
                    };
                    self.buf_map.insert(tensor.clone(), info);
                    self.visit_stmt(body);
                    if let Some(info) = self.buf_map.get_mut(tensor) {
                        info.released = true;
                    }
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }
}
