//! Depth-first read-only traversal of statements and expressions.
//!
//! Implementors override `visit_expr` / `visit_stmt` for the node kinds they
//! care about and delegate the rest to [`walk_expr`] / [`walk_stmt`], which
//! recurse into children in source order.

use std::rc::Rc;

use crate::expr::{ExprKind, PrimExpr};
use crate::stmt::{Stmt, StmtKind};

pub trait ExprVisitor: Sized {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        walk_expr(self, expr);
    }
}

pub trait StmtVisitor: ExprVisitor {
    fn visit_stmt(&mut self, stmt: &Rc<Stmt>) {
        walk_stmt(self, stmt);
    }
}

/// Visit every child expression of `expr`.
pub fn walk_expr<V: ExprVisitor>(visitor: &mut V, expr: &PrimExpr) {
    match expr.kind() {
        ExprKind::Var(_) | ExprKind::IntImm(_) | ExprKind::FloatImm(_) | ExprKind::StringImm(_) => {}
        ExprKind::Cast { value } => visitor.visit_expr(value),
        ExprKind::Add { a, b }
        | ExprKind::Sub { a, b }
        | ExprKind::Mul { a, b }
        | ExprKind::FloorDiv { a, b }
        | ExprKind::FloorMod { a, b } => {
            visitor.visit_expr(a);
            visitor.visit_expr(b);
        }
        ExprKind::ProducerLoad { indices, .. } => {
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Reduce { source, condition, .. } => {
            for src in source {
                visitor.visit_expr(src);
            }
            if let Some(condition) = condition {
                visitor.visit_expr(condition);
            }
        }
    }
}

/// Visit every child statement and expression of `stmt`.
pub fn walk_stmt<V: StmtVisitor>(visitor: &mut V, stmt: &Rc<Stmt>) {
    match stmt.kind() {
        StmtKind::AttrStmt { value, body, .. } => {
            visitor.visit_expr(value);
            visitor.visit_stmt(body);
        }
        StmtKind::ProducerRealize { bounds, condition, body, .. } => {
            for range in bounds {
                visitor.visit_expr(&range.min);
                visitor.visit_expr(&range.extent);
            }
            visitor.visit_expr(condition);
            visitor.visit_stmt(body);
        }
        StmtKind::ProducerStore { value, indices, .. } => {
            visitor.visit_expr(value);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        StmtKind::For { min, extent, body, .. } => {
            visitor.visit_expr(min);
            visitor.visit_expr(extent);
            visitor.visit_stmt(body);
        }
        StmtKind::Seq { stmts } => {
            for stmt in stmts {
                visitor.visit_stmt(stmt);
            }
        }
        StmtKind::Evaluate { value } => visitor.visit_expr(value),
    }
}
