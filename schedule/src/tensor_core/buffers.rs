//! Stage 3: buffer shapes, strides, thread extents, tiles, loop scaling.
//!
//! A second walk over the tree gathers everything the rewrite needs to
//! synthesize fragment buffers and shrink the surrounding loops:
//!
//! - strides per buffer name, computed from shapes when the buffer does not
//!   carry explicit strides (with `buffer_dim_align` rounding applied at
//!   realize entry);
//! - the per-thread tile `(m, n, k)`, cross-assigned from the trailing two
//!   extents of each fragment store according to the operand's role and
//!   layout;
//! - a scaling factor for every loop variable that addresses a fragment's
//!   trailing dimensions;
//! - the stores that fill or load fragments and the stores that write
//!   fragments back out.
//!
//! Qualification then folds the `threadIdx.x`/`threadIdx.y` extents into a
//! warp tile and accepts only the supported tensor-core geometries.

use std::collections::HashMap;
use std::rc::Rc;

use tessera_ir::stmt::{AttrKey, AttrNode};
use tessera_ir::{
    Expr, ExprKind, ExprVisitor, Intrinsic, NodeId, PrimExpr, Region, Stmt, StmtKind, StmtVisitor, Tensor, simplify,
    walk_expr, walk_stmt,
};
use tracing::debug;

use super::roles::RoleMaps;
use super::{ExternBufferMap, MatrixMajor, MatrixRole, Tile, simplify_name, strides_from_shape};

/// Warp tiles the hardware has an instruction for.
const SUPPORTED_WARP_TILES: [(i64, i64, i64); 5] =
    [(16, 16, 16), (8, 32, 16), (32, 8, 16), (8, 8, 32), (8, 8, 128)];

/// Stride alignment hint for one buffer dimension. Zeroes mean unaligned.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DimAlignInfo {
    pub(crate) align_factor: i64,
    pub(crate) align_offset: i64,
}

/// Per-tensor record assembled during the walk.
#[derive(Debug, Clone)]
struct BufferInfo {
    name: String,
    strides: Vec<PrimExpr>,
    shape: Vec<PrimExpr>,
    /// Realize bounds; empty for external buffers.
    bounds: Region,
    external: bool,
    released: bool,
}

impl BufferInfo {
    /// Access indices relative to the realize bounds.
    fn rel_index(&self, indices: &[PrimExpr]) -> Vec<PrimExpr> {
        if self.bounds.is_empty() {
            return indices.to_vec();
        }
        assert_eq!(self.bounds.len(), indices.len(), "access rank differs from realize rank for {}", self.name);
        indices.iter().zip(&self.bounds).map(|(index, range)| Expr::sub(index.clone(), range.min.clone())).collect()
    }
}

/// Everything the rewrite stage needs from this walk.
#[derive(Debug)]
pub(crate) struct BufferAnalysis {
    /// Buffer name → per-dimension strides.
    pub strides: HashMap<String, Vec<PrimExpr>>,
    /// Stores into a fragment (fill or global → fragment copy), with the
    /// destination as a load expression.
    pub frag_load: HashMap<NodeId, PrimExpr>,
    /// Stores of a fragment back to memory, with the destination as a load
    /// expression.
    pub frag_store: HashMap<NodeId, PrimExpr>,
    /// Loop variable → extent divisor. First write wins.
    pub loop_scaling: HashMap<NodeId, i64>,
    pub warp_tile: Tile,
    pub warp_threads_y: i64,
}

pub(crate) fn analyse(stmt: &Rc<Stmt>, extern_buffer: &ExternBufferMap, roles: &RoleMaps) -> Option<BufferAnalysis> {
    let mut analyser = BufferAnalyser::new(extern_buffer, roles);
    analyser.visit_stmt(stmt);
    analyser.qualify()
}

fn assign_or_check(dst: &mut i64, src: i64) -> bool {
    if *dst <= 0 {
        *dst = src;
        return true;
    }
    *dst == src
}

/// Records, against every variable mentioned by a fragment index, the
/// extent of the dimension the index addresses. First write wins.
#[derive(Default)]
struct IndexVisitor {
    loop_scaling: HashMap<NodeId, i64>,
    scaling_factor: i64,
}

impl ExprVisitor for IndexVisitor {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        if let Some(var) = expr.as_var() {
            self.loop_scaling.entry(var.id()).or_insert(self.scaling_factor);
        }
        walk_expr(self, expr);
    }
}

struct BufferAnalyser<'a> {
    roles: &'a RoleMaps,
    buf_map: HashMap<Tensor, BufferInfo>,
    dim_align: HashMap<Tensor, Vec<DimAlignInfo>>,
    /// Thread axis name → constant extent. First write wins.
    thread_extent: HashMap<String, i64>,
    strides: HashMap<String, Vec<PrimExpr>>,
    frag_load: HashMap<NodeId, PrimExpr>,
    frag_store: HashMap<NodeId, PrimExpr>,
    index_visitor: IndexVisitor,
    thread_tile: Tile,
    invalid: bool,
}

impl<'a> BufferAnalyser<'a> {
    fn new(extern_buffer: &ExternBufferMap, roles: &'a RoleMaps) -> Self {
        let buf_map = extern_buffer
            .iter()
            .map(|(tensor, buffer)| {
                let info = BufferInfo {
                    name: buffer.name.clone(),
                    strides: buffer.strides.clone(),
                    shape: buffer.shape.clone(),
                    bounds: Region::new(),
                    external: true,
                    released: false,
                };
                (tensor.clone(), info)
            })
            .collect();
        Self {
            roles,
            buf_map,
            dim_align: HashMap::new(),
            thread_extent: HashMap::new(),
            strides: HashMap::new(),
            frag_load: HashMap::new(),
            frag_store: HashMap::new(),
            index_visitor: IndexVisitor::default(),
            thread_tile: Tile::default(),
            invalid: false,
        }
    }

    /// Tensors with a classified role must keep constant trailing
    /// dimensions divisible by 16. Flags the analysis invalid otherwise.
    fn validate_classified_shape(&mut self, info: &BufferInfo) -> bool {
        if info.shape.len() < 2 {
            self.invalid = true;
            return false;
        }
        for dim in [info.shape.len() - 1, info.shape.len() - 2] {
            match info.shape[dim].as_int_imm() {
                Some(extent) if extent % 16 == 0 => {}
                _ => {
                    self.invalid = true;
                    return false;
                }
            }
        }
        true
    }

    fn record_strides(&mut self, info: &BufferInfo) {
        let strides =
            if !info.strides.is_empty() { info.strides.clone() } else { strides_from_shape(&info.shape) };
        self.strides.entry(info.name.clone()).or_insert(strides);
    }

    /// Walk the trailing two relative indices of a fragment access,
    /// recording each dimension's extent as the scaling factor for the
    /// variables the index mentions. Returns the extents trailing-first,
    /// or `None` in the load path when a dimension is not constant.
    fn scan_fragment_index(&mut self, info: &BufferInfo, indices: &[PrimExpr]) -> [Option<i64>; 2] {
        let rel_index = info.rel_index(indices);
        let mut extents = [None; 2];
        for (slot, dim) in [indices.len() - 1, indices.len() - 2].into_iter().enumerate() {
            self.index_visitor.scaling_factor = 16;
            if let Some(extent) = info.shape[dim].as_int_imm() {
                extents[slot] = Some(extent);
                self.index_visitor.scaling_factor = extent;
            }
            let simplified = simplify(&rel_index[dim]);
            self.index_visitor.visit_expr(&simplified);
        }
        extents
    }

    fn handle_store(&mut self, stmt: &Rc<Stmt>) {
        let StmtKind::ProducerStore { tensor, value, indices } = stmt.kind() else { return };

        let info = self
            .buf_map
            .get(tensor)
            .unwrap_or_else(|| panic!("cannot find allocated buffer for {}", tensor.name()))
            .clone();
        assert!(!info.released, "store into buffer {} after its realize scope closed", info.name);

        if self.roles.matrix_abc.contains_key(tensor.name()) && !self.validate_classified_shape(&info) {
            return;
        }

        self.record_strides(&info);

        if self.roles.frag_reg.contains(&info.name) {
            let dst = Expr::producer_load(tensor.clone(), indices.iter().cloned())
                .expect("store indices are valid load indices");
            self.frag_load.insert(stmt.id(), dst);

            if indices.len() < 2 {
                self.invalid = true;
                return;
            }
            let extents = self.scan_fragment_index(&info, indices);
            let mut tile_size = [0i64; 2];
            for (slot, extent) in extents.into_iter().enumerate() {
                // In the store path every trailing dimension must be a
                // constant, or no tile can be inferred.
                let Some(extent) = extent else {
                    self.invalid = true;
                    return;
                };
                tile_size[slot] = extent;
            }

            let input_name = simplify_name(&info.name);
            let role = self.roles.matrix_abc.get(input_name).copied();
            let major = self.roles.matrix_major.get(input_name).copied();
            if let (Some(role), Some(major)) = (role, major) {
                let tile = &mut self.thread_tile;
                let consistent = match (role, major) {
                    (MatrixRole::MatrixA, MatrixMajor::ColMajor) => {
                        assign_or_check(&mut tile.m, tile_size[0]) && assign_or_check(&mut tile.k, tile_size[1])
                    }
                    (MatrixRole::MatrixA, MatrixMajor::RowMajor) => {
                        assign_or_check(&mut tile.k, tile_size[0]) && assign_or_check(&mut tile.m, tile_size[1])
                    }
                    (MatrixRole::MatrixB, MatrixMajor::ColMajor) => {
                        assign_or_check(&mut tile.k, tile_size[0]) && assign_or_check(&mut tile.n, tile_size[1])
                    }
                    (MatrixRole::MatrixB, MatrixMajor::RowMajor) => {
                        assign_or_check(&mut tile.n, tile_size[0]) && assign_or_check(&mut tile.k, tile_size[1])
                    }
                    (MatrixRole::Accumulator, _) => {
                        assign_or_check(&mut tile.m, tile_size[0]) && assign_or_check(&mut tile.n, tile_size[1])
                    }
                };
                if !consistent {
                    self.invalid = true;
                    return;
                }
            }
        }

        // Fragment written back out: the stored value is a plain load from
        // a fragment buffer. Matching by buffer name mirrors the fragment
        // registry's keying.
        if let Some((source, _)) = value.as_producer_load()
            && self.roles.frag_reg.contains(source.name())
        {
            let dst = Expr::producer_load(tensor.clone(), indices.iter().cloned())
                .expect("store indices are valid load indices");
            self.frag_store.insert(stmt.id(), dst);
        }
    }

    fn handle_load(&mut self, expr: &PrimExpr) {
        let ExprKind::ProducerLoad { tensor, indices } = expr.kind() else { return };

        let info = self
            .buf_map
            .get(tensor)
            .unwrap_or_else(|| panic!("cannot find allocated buffer for {}", tensor.name()))
            .clone();
        assert!(!info.released, "load from buffer {} after its realize scope closed", info.name);

        if self.roles.matrix_abc.contains_key(tensor.name()) && !self.validate_classified_shape(&info) {
            return;
        }

        self.record_strides(&info);

        if !self.roles.frag_reg.contains(&info.name) {
            return;
        }
        if indices.len() < 2 {
            self.invalid = true;
            return;
        }
        self.scan_fragment_index(&info, indices);
    }

    /// Derive the warp tile from the thread tile and the thread extents,
    /// and accept only supported geometries.
    fn qualify(self) -> Option<BufferAnalysis> {
        if self.invalid {
            debug!("buffer analysis marked invalid");
            return None;
        }
        let thread_x = *self.thread_extent.get("threadIdx.x")?;
        if !(1..=32).contains(&thread_x) {
            return None;
        }
        let warp_threads_y = 32 / thread_x;
        let thread_y = *self.thread_extent.get("threadIdx.y")?;
        if thread_y < warp_threads_y || thread_y % warp_threads_y != 0 {
            debug!(thread_y, warp_threads_y, "threadIdx.y extent does not cover whole warps");
            return None;
        }

        let warp_tile =
            Tile { m: thread_x * self.thread_tile.m, n: warp_threads_y * self.thread_tile.n, k: self.thread_tile.k };
        if !SUPPORTED_WARP_TILES.contains(&(warp_tile.m, warp_tile.n, warp_tile.k)) {
            debug!(m = warp_tile.m, n = warp_tile.n, k = warp_tile.k, "unsupported warp tile");
            return None;
        }

        Some(BufferAnalysis {
            strides: self.strides,
            frag_load: self.frag_load,
            frag_store: self.frag_store,
            loop_scaling: self.index_visitor.loop_scaling,
            warp_tile,
            warp_threads_y,
        })
    }
}

/// Strides honoring per-dimension alignment: computed innermost-out, each
/// aligned stride rounded so `stride % align_factor == align_offset`.
pub(crate) fn aligned_strides(shape: &[PrimExpr], aligns: &[DimAlignInfo]) -> Vec<PrimExpr> {
    let dtype = shape[0].dtype();
    let mut reversed = Vec::with_capacity(shape.len());
    let mut stride = Expr::int(dtype, 1);
    for dim in (0..shape.len()).rev() {
        if let Some(align) = aligns.get(dim)
            && align.align_factor != 0
        {
            let factor = Expr::int(dtype, align.align_factor);
            let offset = Expr::int(dtype, align.align_offset);
            let adjust = Expr::floormod(
                Expr::sub(Expr::add(factor.clone(), offset), Expr::floormod(stride.clone(), factor.clone())),
                factor,
            );
            stride = Expr::add(stride, adjust);
        }
        let canonical = simplify(&stride);
        reversed.push(canonical.clone());
        stride = Expr::mul(canonical, shape[dim].clone());
    }
    reversed.reverse();
    reversed
}

impl ExprVisitor for BufferAnalyser<'_> {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        walk_expr(self, expr);
        if matches!(expr.kind(), ExprKind::ProducerLoad { .. }) {
            self.handle_load(expr);
        }
    }
}

impl StmtVisitor for BufferAnalyser<'_> {
    fn visit_stmt(&mut self, stmt: &Rc<Stmt>) {
        match stmt.kind() {
            StmtKind::AttrStmt { key: AttrKey::ThreadExtent, node, value, .. } => {
                if let AttrNode::IterVar(iter_var) = node
                    && let Some(extent) = value.as_int_imm()
                {
                    self.thread_extent.entry(iter_var.var.name_hint().to_string()).or_insert(extent);
                }
                walk_stmt(self, stmt);
            }
            StmtKind::AttrStmt { key: AttrKey::BufferDimAlign, node, value, body } => {
                let AttrNode::Tensor(tensor) = node else {
                    panic!("buffer_dim_align must reference a tensor");
                };
                let ExprKind::Call { op: Intrinsic::Tuple, args } = value.kind() else {
                    panic!("buffer_dim_align value must be a tuple call");
                };
                let dim = args[0].as_int_imm().expect("alignment dimension must be constant") as usize;
                let align_factor = args[1].as_int_imm().expect("alignment factor must be constant");
                let align_offset = args[2].as_int_imm().expect("alignment offset must be constant");
                let aligns = self.dim_align.entry(tensor.clone()).or_default();
                if dim >= aligns.len() {
                    aligns.resize(dim + 1, DimAlignInfo::default());
                }
                aligns[dim] = DimAlignInfo { align_factor, align_offset };
                self.visit_stmt(body);
            }
            StmtKind::ProducerStore { .. } => {
                walk_stmt(self, stmt);
                self.handle_store(stmt);
            }
            StmtKind::ProducerRealize { tensor, bounds, body, .. } => {
                if let Some(info) = self.buf_map.get(tensor) {
                    assert!(info.external, "tensor {} realized twice", tensor.name());
                    self.visit_stmt(body);
                } else {
                    let shape: Vec<PrimExpr> = bounds.iter().map(|range| range.extent.clone()).collect();
                    let strides = match self.dim_align.get(tensor) {
                        Some(aligns) if !shape.is_empty() => aligned_strides(&shape, aligns),
                        _ => Vec::new(),
                    };
                    let info = BufferInfo {
                        name: tensor.name().to_string(),
                        strides,
                        shape,
                        bounds: bounds.clone(),
                        external: false,
                        released: false,
                    };
                    self.buf_map.insert(tensor.clone(), info);
                    self.visit_stmt(body);
                    self.buf_map.get_mut(tensor).expect("entry installed above").released = true;
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }
}
