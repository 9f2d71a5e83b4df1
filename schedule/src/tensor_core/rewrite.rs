//! Stage 4: structural rewrite to fragment intrinsics.
//!
//! One mutation pass over the tree:
//!
//! - fragment realizations shrink their trailing two extents to the warp
//!   tile and their `realize_scope` becomes `wmma.<role>`;
//! - the matched store becomes `tvm_mma_sync` (or `tvm_bmma_sync` for
//!   1-bit inputs) under a `buffer_bind_scope` nest binding the C, B, and A
//!   fragments outer-to-inner;
//! - constant fills become `tvm_fill_fragment`, global → fragment copies
//!   become `tvm_load_matrix_sync`, fragment → global writes become
//!   `tvm_store_matrix_sync`;
//! - addresses handed to the intrinsics collapse the warp to its issuing
//!   lane (`threadIdx.x` → 0, `threadIdx.y` floored to a warp boundary);
//! - loops whose variable addressed a fragment dimension divide their
//!   extent by the recorded scaling factor.

use std::collections::HashMap;
use std::rc::Rc;

use tessera_dtype::DType;
use tessera_ir::stmt::{AttrKey, AttrNode, Range};
use tessera_ir::{
    Buffer, Expr, ExprKind, ExprMutator, Intrinsic, PrimExpr, Region, Stmt, StmtKind, StmtMutator, Tensor, VarNode,
    remap_expr, remap_stmt, simplify,
};

use super::buffers::BufferAnalysis;
use super::roles::RoleMaps;
use super::{MatrixMajor, MatrixRole, simplify_name, strides_from_shape};

pub(crate) fn apply(stmt: &Rc<Stmt>, roles: &RoleMaps, analysis: &BufferAnalysis) -> Rc<Stmt> {
    let mut rewriter = TensorCoreRewriter { roles, analysis, bounds: HashMap::new() };
    rewriter.mutate_stmt(stmt)
}

/// Collapses a warp to its issuing lane inside fragment addresses:
/// `threadIdx.x` becomes 0 and `threadIdx.y` is floored to a warp boundary.
struct ThreadIndexRewriter {
    warp_y: i64,
}

impl ExprMutator for ThreadIndexRewriter {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        if let Some(var) = expr.as_var() {
            if var.name_hint() == "threadIdx.x" {
                return Expr::int32(0);
            }
            if var.name_hint() == "threadIdx.y" {
                let warp_y = Expr::int32(self.warp_y);
                return Expr::mul(Expr::floordiv(expr.clone(), warp_y.clone()), warp_y);
            }
        }
        remap_expr(self, expr)
    }
}

struct TensorCoreRewriter<'a> {
    roles: &'a RoleMaps,
    analysis: &'a BufferAnalysis,
    /// Realize bounds seen on the way down, for offset reconstruction.
    bounds: HashMap<Tensor, Region>,
}

impl TensorCoreRewriter<'_> {
    /// Fragment extents (second-to-last, last) for the realize region and
    /// the synthesized buffer shape, by role and layout.
    fn tile_size(&self, name: &str) -> (i64, i64) {
        let role = self.roles.matrix_abc.get(name).unwrap_or_else(|| panic!("cannot find matrix info for {name}"));
        let major =
            self.roles.matrix_major.get(name).unwrap_or_else(|| panic!("cannot find matrix layout for {name}"));
        let warp = self.analysis.warp_tile;
        match (role, major) {
            (MatrixRole::MatrixA, MatrixMajor::ColMajor) => (warp.k, warp.m),
            (MatrixRole::MatrixA, MatrixMajor::RowMajor) => (warp.m, warp.k),
            (MatrixRole::MatrixB, MatrixMajor::RowMajor) => (warp.k, warp.n),
            (MatrixRole::MatrixB, MatrixMajor::ColMajor) => (warp.n, warp.k),
            (MatrixRole::Accumulator, _) => (warp.n, warp.m),
        }
    }

    /// Synthesize the buffer view for one fragment access, plus the
    /// `tvm_tuple(index, extent, ...)` payload of its binding attribute.
    fn fragment_buffer(&self, pload: &PrimExpr) -> (Buffer, PrimExpr) {
        let (tensor, indices) = pload.as_producer_load().expect("fragment operand must be a producer load");
        let bounds = self
            .bounds
            .get(tensor)
            .unwrap_or_else(|| panic!("no realize bounds recorded for {}", tensor.name()));
        assert!(bounds.len() >= 2, "fewer than 2 realize dimensions for matrix {}", tensor.name());
        assert_eq!(indices.len(), bounds.len(), "access rank differs from realize rank for {}", tensor.name());

        let (size0, size1) = self.tile_size(simplify_name(tensor.name()));
        let mut shape: Vec<PrimExpr> = bounds[..bounds.len() - 2].iter().map(|r| r.extent.clone()).collect();
        shape.push(Expr::int32(size0));
        shape.push(Expr::int32(size1));
        let strides = strides_from_shape(&shape);

        let mut elem_offset = Expr::int32(0);
        for ((index, stride), range) in indices.iter().zip(&strides).zip(bounds) {
            elem_offset =
                Expr::add(elem_offset, Expr::mul(stride.clone(), Expr::sub(index.clone(), range.min.clone())));
        }
        let elem_offset = simplify(&elem_offset);

        let role = self
            .roles
            .matrix_abc
            .get(simplify_name(tensor.name()))
            .unwrap_or_else(|| panic!("cannot find matrix info for {}", tensor.name()));
        let buffer = Buffer::builder()
            .data(VarNode::new(tensor.name(), DType::Handle))
            .name(tensor.name().to_string())
            .scope(role.scope())
            .dtype(tensor.dtype())
            .shape(shape.clone())
            .strides(strides)
            .elem_offset(elem_offset)
            .build();

        let mut tuple_args = Vec::with_capacity(indices.len() * 2);
        for (index, extent) in indices.iter().zip(&shape) {
            tuple_args.push(index.clone());
            tuple_args.push(extent.clone());
        }
        let tuple = Expr::call(Intrinsic::Tuple, tuple_args, DType::Handle);

        (buffer, tuple)
    }

    fn warp_dims(&self) -> [PrimExpr; 3] {
        let warp = self.analysis.warp_tile;
        [Expr::int32(warp.m), Expr::int32(warp.n), Expr::int32(warp.k)]
    }

    fn rewrite_realize(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        let StmtKind::ProducerRealize { tensor, bounds, .. } = stmt.kind() else { unreachable!() };
        self.bounds.insert(tensor.clone(), bounds.clone());
        let is_fragment = self.roles.frag_reg.contains(tensor.name());

        let mutated = remap_stmt(self, stmt);
        if !is_fragment {
            return mutated;
        }

        let StmtKind::ProducerRealize { tensor, bounds, condition, body } = mutated.kind() else { unreachable!() };
        assert!(bounds.len() >= 2, "fewer than 2 realize dimensions for matrix {}", tensor.name());
        let (size0, size1) = self.tile_size(simplify_name(tensor.name()));
        let mut new_bounds: Region = bounds[..bounds.len() - 2].to_vec();
        new_bounds.push(Range::from_min_extent(bounds[bounds.len() - 2].min.clone(), Expr::int32(size0)));
        new_bounds.push(Range::from_min_extent(bounds[bounds.len() - 1].min.clone(), Expr::int32(size1)));
        Stmt::realize(tensor.clone(), new_bounds, condition.clone(), body.clone())
    }

    fn rewrite_attr(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        let mutated = remap_stmt(self, stmt);
        if let StmtKind::AttrStmt { node, key: AttrKey::RealizeScope, body, .. } = mutated.kind()
            && let AttrNode::Tensor(tensor) = node
            && self.roles.frag_reg.contains(tensor.name())
        {
            let role = self
                .roles
                .matrix_abc
                .get(simplify_name(tensor.name()))
                .unwrap_or_else(|| panic!("cannot find matrix info for {}", tensor.name()));
            return Stmt::attr(node.clone(), AttrKey::RealizeScope, Expr::string(role.scope()), body.clone());
        }
        mutated
    }

    fn rewrite_store(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        let mutated = remap_stmt(self, stmt);
        if let Some(operands) = self.roles.mma_sync.get(&stmt.id()) {
            return self.emit_mma_sync(operands.clone());
        }
        if self.analysis.frag_load.contains_key(&stmt.id()) {
            return self.emit_fragment_fill_or_load(stmt);
        }
        if self.analysis.frag_store.contains_key(&stmt.id()) {
            return self.emit_fragment_store(stmt);
        }
        mutated
    }

    /// `C += A * B` on register fragments, one instruction per warp.
    fn emit_mma_sync(&mut self, operands: [PrimExpr; 3]) -> Rc<Stmt> {
        let [a, b, c] = operands;
        let intrinsic = if a.dtype() == DType::Int1 && b.dtype() == DType::Int1 {
            Intrinsic::BmmaSync
        } else {
            Intrinsic::MmaSync
        };

        let (buffer_a, tuple_a) = self.fragment_buffer(&a);
        let (buffer_b, tuple_b) = self.fragment_buffer(&b);
        let (buffer_c, tuple_c) = self.fragment_buffer(&c);

        let args = vec![
            Expr::var(buffer_c.data.clone()),
            buffer_c.elem_offset.clone(),
            Expr::var(buffer_a.data.clone()),
            buffer_a.elem_offset.clone(),
            Expr::var(buffer_b.data.clone()),
            buffer_b.elem_offset.clone(),
            Expr::var(buffer_c.data.clone()),
            buffer_c.elem_offset.clone(),
        ];
        let call = Stmt::evaluate(Expr::call(intrinsic, args, DType::Handle));

        // Bindings nest outer-to-inner C, B, A around the call.
        let inner = bind_scope(buffer_a, tensor_of(&a), tuple_a, call);
        let middle = bind_scope(buffer_b, tensor_of(&b), tuple_b, inner);
        bind_scope(buffer_c, tensor_of(&c), tuple_c, middle)
    }

    /// Constant stores become fragment fills; copies from memory become
    /// matrix loads with a warp-collapsed source address.
    fn emit_fragment_fill_or_load(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        let StmtKind::ProducerStore { value, .. } = stmt.kind() else { unreachable!() };
        let dst = self.analysis.frag_load[&stmt.id()].clone();
        let dst_tensor = tensor_of(&dst);
        let [m, n, k] = self.warp_dims();

        if matches!(value.kind(), ExprKind::FloatImm(_) | ExprKind::IntImm(_)) {
            let (buffer, tuple) = self.fragment_buffer(&dst);
            let args =
                vec![Expr::var(buffer.data.clone()), m, n, k, buffer.elem_offset.clone(), value.clone()];
            let call = Stmt::evaluate(Expr::call(Intrinsic::FillFragment, args, DType::Handle));
            return bind_scope(buffer, dst_tensor, tuple, call);
        }

        let (source, _) = value.as_producer_load().expect("can only load a fragment from a buffer");
        let strides = self
            .analysis
            .strides
            .get(source.name())
            .unwrap_or_else(|| panic!("cannot find strides for {}", source.name()));
        assert!(strides.len() >= 2, "source of a matrix load needs at least 2 dimensions");
        let stride = strides[strides.len() - 2].clone();

        let collapsed = ThreadIndexRewriter { warp_y: self.analysis.warp_threads_y }.mutate_expr(value);
        let src = Expr::call(Intrinsic::CallExtern, vec![Expr::string("&"), collapsed], value.dtype());

        let major = self
            .roles
            .matrix_major
            .get(simplify_name(dst_tensor.name()))
            .unwrap_or_else(|| panic!("cannot determine matrix layout for {}", dst_tensor.name()));

        let (buffer, tuple) = self.fragment_buffer(&dst);
        let args = vec![
            Expr::var(buffer.data.clone()),
            m,
            n,
            k,
            buffer.elem_offset.clone(),
            src,
            stride,
            Expr::string(major.as_str()),
        ];
        let call = Stmt::evaluate(Expr::call(Intrinsic::LoadMatrixSync, args, DType::Handle));
        bind_scope(buffer, dst_tensor, tuple, call)
    }

    /// Fragment written back to memory: a matrix store with a
    /// warp-collapsed destination address.
    fn emit_fragment_store(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        let StmtKind::ProducerStore { tensor, value, .. } = stmt.kind() else { unreachable!() };
        let strides = self
            .analysis
            .strides
            .get(tensor.name())
            .unwrap_or_else(|| panic!("cannot find strides for {}", tensor.name()));
        assert!(strides.len() >= 2, "destination of a matrix store needs at least 2 dimensions");
        let stride = strides[strides.len() - 2].clone();

        let dst = self.analysis.frag_store[&stmt.id()].clone();
        let collapsed = ThreadIndexRewriter { warp_y: self.analysis.warp_threads_y }.mutate_expr(&dst);
        let dst = Expr::call(Intrinsic::CallExtern, vec![Expr::string("&"), collapsed], DType::Handle);

        let source = value.clone();
        let source_tensor = tensor_of(&source);
        let [m, n, k] = self.warp_dims();
        let (buffer, tuple) = self.fragment_buffer(&source);
        let args = vec![
            Expr::var(buffer.data.clone()),
            m,
            n,
            k,
            buffer.elem_offset.clone(),
            dst,
            stride,
            Expr::string(MatrixMajor::ColMajor.as_str()),
        ];
        let call = Stmt::evaluate(Expr::call(Intrinsic::StoreMatrixSync, args, DType::Handle));
        bind_scope(buffer, source_tensor, tuple, call)
    }

    fn rewrite_for(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        let mutated = remap_stmt(self, stmt);
        let factor = {
            let StmtKind::For { loop_var, .. } = stmt.kind() else { unreachable!() };
            self.analysis.loop_scaling.get(&loop_var.id()).copied()
        };
        let Some(factor) = factor else {
            return mutated;
        };
        let StmtKind::For { loop_var, min, extent, kind, body } = mutated.kind() else { unreachable!() };
        let scaled = extent.as_int_imm().map_or(1, |extent| extent / factor);
        Stmt::for_(loop_var.clone(), min.clone(), Expr::int(extent.dtype(), scaled), *kind, body.clone())
    }
}

fn tensor_of(pload: &PrimExpr) -> Tensor {
    pload.as_producer_load().expect("fragment operand must be a producer load").0.clone()
}

fn bind_scope(buffer: Buffer, tensor: Tensor, tuple: PrimExpr, body: Rc<Stmt>) -> Rc<Stmt> {
    Stmt::attr(AttrNode::BufferBind { buffer: Rc::new(buffer), tensor }, AttrKey::BufferBindScope, tuple, body)
}

impl ExprMutator for TensorCoreRewriter<'_> {}

impl StmtMutator for TensorCoreRewriter<'_> {
    fn mutate_stmt(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        match stmt.kind() {
            StmtKind::ProducerRealize { .. } => self.rewrite_realize(stmt),
            StmtKind::AttrStmt { .. } => self.rewrite_attr(stmt),
            StmtKind::ProducerStore { .. } => self.rewrite_store(stmt),
            StmtKind::For { .. } => self.rewrite_for(stmt),
            _ => remap_stmt(self, stmt),
        }
    }
}
