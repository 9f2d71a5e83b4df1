//! Warp-level tensor-core rewrite of scheduled matrix programs.
//!
//! Takes the statement tree produced by schedule lowering and, where the
//! scheduler placed a `pragma_tensor_core` attribute, lowers the recognized
//! `C += cast(A) * cast(B)` subtree to fragment intrinsics: per-warp
//! register tiles that are filled, loaded, multiplied with `tvm_mma_sync`
//! (or `tvm_bmma_sync` for 1-bit inputs), and stored back with a single
//! instruction per warp.
//!
//! The rewrite runs as four sequential stages, each consuming the previous
//! stage's read-only record:
//!
//! 1. [`matching`] walks the tree once and recognizes qualifying stores over
//!    local-scope buffers.
//! 2. [`roles`] classifies each participating tensor as `matrix_a`,
//!    `matrix_b`, or `accumulator` with a `row_major`/`col_major` layout by
//!    inspecting the schedule's reduction body, and canonicalizes the
//!    operand order of every matched store.
//! 3. [`buffers`] walks the tree a second time for strides, thread extents,
//!    per-thread tile sizes, and loop scaling factors, then derives the warp
//!    tile and checks it against the supported geometries.
//! 4. [`rewrite`] performs the structural rewrite: shrunk fragment
//!    realizations, `wmma.*` storage scopes, intrinsic calls under
//!    `buffer_bind_scope` bindings, collapsed thread indices, and divided
//!    loop extents.
//!
//! Every stage may conclude the program is not worth rewriting — wrong
//! target, nothing matched, ambiguous classification, unsupported warp
//! tile. Those are graceful outcomes: the driver hands back the input tree
//! untouched and later passes lower the program as an ordinary kernel.

pub(crate) mod buffers;
pub(crate) mod matching;
pub(crate) mod rewrite;
pub(crate) mod roles;

use std::collections::HashMap;
use std::rc::Rc;

use tessera_dtype::DType;
use tessera_ir::{Buffer, Expr, ExprKind, PrimExpr, Stmt, Tensor};
use tracing::debug;

use crate::compute::Schedule;
use crate::target::{DeviceKind, Target, TargetKind, device_api};

/// Externally-provided buffers keyed by the tensor they back.
pub type ExternBufferMap = HashMap<Tensor, Rc<Buffer>>;

/// Role a fragment plays in the `C += A * B` computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixRole {
    MatrixA,
    MatrixB,
    Accumulator,
}

impl MatrixRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MatrixA => "matrix_a",
            Self::MatrixB => "matrix_b",
            Self::Accumulator => "accumulator",
        }
    }

    /// Storage scope of a fragment with this role.
    pub fn scope(self) -> String {
        format!("wmma.{}", self.as_str())
    }
}

/// Fragment layout for matrix load/store intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixMajor {
    RowMajor,
    ColMajor,
}

impl MatrixMajor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RowMajor => "row_major",
            Self::ColMajor => "col_major",
        }
    }
}

/// Matrix-multiply-accumulate shape. `-1` marks an unassigned dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub m: i64,
    pub n: i64,
    pub k: i64,
}

impl Default for Tile {
    fn default() -> Self {
        Self { m: -1, n: -1, k: -1 }
    }
}

/// Textual prefix before the first `.`.
///
/// Cache stages carry suffixed names (`A.local`), and role tables are keyed
/// by the shared prefix. Name-based keying is fragile but is the convention
/// the surrounding compiler relies on; keep it.
pub(crate) fn simplify_name(input: &str) -> &str {
    match input.find('.') {
        Some(pos) => &input[..pos],
        None => input,
    }
}

/// Strip a cast whose target dtype is `target`.
///
/// Non-cast expressions pass through unchanged; a cast to any other dtype
/// yields `None`, which callers treat as a structural mismatch.
pub(crate) fn unpack_cast(expr: &PrimExpr, target: DType) -> Option<PrimExpr> {
    match expr.kind() {
        ExprKind::Cast { value } if expr.dtype() == target => Some(value.clone()),
        ExprKind::Cast { .. } => None,
        _ => Some(expr.clone()),
    }
}

/// Dense row-major strides for `shape`, innermost stride 1.
pub(crate) fn strides_from_shape(shape: &[PrimExpr]) -> Vec<PrimExpr> {
    let mut strides = Vec::with_capacity(shape.len());
    for dim in 1..shape.len() {
        let mut stride = Expr::int32(1);
        for j in (dim..shape.len()).rev() {
            stride = Expr::mul(stride, shape[j].clone());
        }
        strides.push(tessera_ir::simplify(&stride));
    }
    strides.push(Expr::int32(1));
    strides
}

/// Rewrite `stmt` so the matched matrix-multiply-accumulate subtree runs on
/// tensor cores.
///
/// Returns the input unchanged unless the current target is CUDA, a CUDA
/// runtime is resolvable, a store matched, the roles are consistent, and the
/// inferred warp tile is supported.
pub fn rewrite_for_tensor_core(stmt: &Rc<Stmt>, schedule: &Schedule, extern_buffer: &ExternBufferMap) -> Rc<Stmt> {
    if let Some(target) = Target::current()
        && target.kind() != TargetKind::Cuda
    {
        debug!(kind = target.kind().name(), "tensor core rewrite skipped: target is not cuda");
        return stmt.clone();
    }
    if device_api(DeviceKind::Cuda).is_none() {
        debug!("tensor core rewrite skipped: no cuda device runtime");
        return stmt.clone();
    }

    let matched = matching::run(stmt, extern_buffer);
    if !matched.matched {
        debug!("tensor core rewrite skipped: no mma store matched");
        return stmt.clone();
    }

    let Some(roles) = roles::identify(schedule, matched) else {
        debug!("tensor core rewrite skipped: matrix roles could not be identified");
        return stmt.clone();
    };

    let Some(analysis) = buffers::analyse(stmt, extern_buffer, &roles) else {
        debug!("tensor core rewrite skipped: buffer analysis did not qualify a warp tile");
        return stmt.clone();
    };

    debug!(
        m = analysis.warp_tile.m,
        n = analysis.warp_tile.n,
        k = analysis.warp_tile.k,
        "rewriting for tensor core"
    );
    rewrite::apply(stmt, &roles, &analysis)
}
