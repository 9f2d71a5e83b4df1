//! Tree intermediate representation for scheduled tensor programs.
//!
//! The IR is a value-based statement/expression tree produced by schedule
//! lowering and consumed by post-scheduling rewrites. Unlike a hash-consed
//! graph, every node here is distinct: analyses key their tables by the
//! stable [`NodeId`] each node draws at construction, so a pass can record
//! facts about one particular store or loop and find it again during the
//! rewrite walk.
//!
//! # Module Organization
//!
//! - [`expr`] - expressions: variables, immediates, arithmetic, producer
//!   loads, opaque intrinsic calls, reductions
//! - [`stmt`] - statements: attributes, realizations, stores, loops
//! - [`buffer`] - buffer descriptors attached to opaque calls
//! - [`visit`] - depth-first read-only traversal
//! - [`mutate`] - rebuilding traversal that preserves untouched subtrees
//! - [`simplify`] - arithmetic canonicalization of index expressions

use std::cell::Cell;

pub mod buffer;
pub mod error;
pub mod expr;
pub mod mutate;
pub mod simplify;
pub mod stmt;
pub mod visit;

#[cfg(test)]
pub mod test;

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use expr::{CommReducer, Expr, ExprKind, Intrinsic, PrimExpr, Var, VarNode};
pub use mutate::{ExprMutator, StmtMutator, remap_expr, remap_stmt};
pub use simplify::simplify;
pub use stmt::{AttrKey, AttrNode, ForKind, IterVar, Range, Region, Stmt, StmtKind, Tensor, TensorNode};
pub use visit::{ExprVisitor, StmtVisitor, walk_expr, walk_stmt};

/// Stable identity of an IR node.
///
/// Ids are drawn from a thread-local monotonic counter and never repeat, so
/// maps keyed by `NodeId` cannot suffer from address reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

// Thread-local counter keeps node construction free of atomics; the IR is
// built and rewritten on a single thread.
thread_local! {
    static NODE_ID_COUNTER: Cell<u64> = const { Cell::new(0) };
}

pub(crate) fn next_node_id() -> NodeId {
    NODE_ID_COUNTER.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        NodeId(id)
    })
}
