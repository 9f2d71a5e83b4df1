//! Rebuilding traversal of statements and expressions.
//!
//! The default `remap_*` functions reconstruct a node only when one of its
//! children actually changed (pointer comparison), so untouched subtrees keep
//! their identity. A pass that declines every rewrite therefore returns the
//! very tree it was given.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::expr::{Expr, ExprKind, PrimExpr};
use crate::stmt::{Range, Stmt, StmtKind};

pub trait ExprMutator: Sized {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        remap_expr(self, expr)
    }
}

pub trait StmtMutator: ExprMutator {
    fn mutate_stmt(&mut self, stmt: &Rc<Stmt>) -> Rc<Stmt> {
        remap_stmt(self, stmt)
    }
}

fn rebuild_binary<M: ExprMutator>(
    mutator: &mut M,
    expr: &PrimExpr,
    a: &PrimExpr,
    b: &PrimExpr,
    make: impl FnOnce(PrimExpr, PrimExpr) -> ExprKind,
) -> PrimExpr {
    let new_a = mutator.mutate_expr(a);
    let new_b = mutator.mutate_expr(b);
    if Rc::ptr_eq(&new_a, a) && Rc::ptr_eq(&new_b, b) {
        expr.clone()
    } else {
        Expr::new(make(new_a, new_b), expr.dtype())
    }
}

/// Rebuild `expr` with every child passed through the mutator.
pub fn remap_expr<M: ExprMutator>(mutator: &mut M, expr: &PrimExpr) -> PrimExpr {
    match expr.kind() {
        ExprKind::Var(_) | ExprKind::IntImm(_) | ExprKind::FloatImm(_) | ExprKind::StringImm(_) => expr.clone(),
        ExprKind::Cast { value } => {
            let new_value = mutator.mutate_expr(value);
            if Rc::ptr_eq(&new_value, value) {
                expr.clone()
            } else {
                Expr::new(ExprKind::Cast { value: new_value }, expr.dtype())
            }
        }
        ExprKind::Add { a, b } => rebuild_binary(mutator, expr, a, b, |a, b| ExprKind::Add { a, b }),
        ExprKind::Sub { a, b } => rebuild_binary(mutator, expr, a, b, |a, b| ExprKind::Sub { a, b }),
        ExprKind::Mul { a, b } => rebuild_binary(mutator, expr, a, b, |a, b| ExprKind::Mul { a, b }),
        ExprKind::FloorDiv { a, b } => rebuild_binary(mutator, expr, a, b, |a, b| ExprKind::FloorDiv { a, b }),
        ExprKind::FloorMod { a, b } => rebuild_binary(mutator, expr, a, b, |a, b| ExprKind::FloorMod { a, b }),
        ExprKind::ProducerLoad { tensor, indices } => {
            let new_indices: SmallVec<[PrimExpr; 4]> = indices.iter().map(|i| mutator.mutate_expr(i)).collect();
            if indices.iter().zip(&new_indices).all(|(old, new)| Rc::ptr_eq(old, new)) {
                expr.clone()
            } else {
                Expr::new(ExprKind::ProducerLoad { tensor: tensor.clone(), indices: new_indices }, expr.dtype())
            }
        }
        ExprKind::Call { op, args } => {
            let new_args: SmallVec<[PrimExpr; 4]> = args.iter().map(|a| mutator.mutate_expr(a)).collect();
            if args.iter().zip(&new_args).all(|(old, new)| Rc::ptr_eq(old, new)) {
                expr.clone()
            } else {
                Expr::new(ExprKind::Call { op: *op, args: new_args }, expr.dtype())
            }
        }
        ExprKind::Reduce { combiner, source, axis, condition } => {
            let new_source: SmallVec<[PrimExpr; 2]> = source.iter().map(|s| mutator.mutate_expr(s)).collect();
            let new_condition = condition.as_ref().map(|c| mutator.mutate_expr(c));
            let unchanged = source.iter().zip(&new_source).all(|(old, new)| Rc::ptr_eq(old, new))
                && match (condition, &new_condition) {
                    (Some(old), Some(new)) => Rc::ptr_eq(old, new),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged {
                expr.clone()
            } else {
                Expr::new(
                    ExprKind::Reduce {
                        combiner: combiner.clone(),
                        source: new_source,
                        axis: axis.clone(),
                        condition: new_condition,
                    },
                    expr.dtype(),
                )
            }
        }
    }
}

/// Rebuild `stmt` with every child passed through the mutator.
pub fn remap_stmt<M: StmtMutator>(mutator: &mut M, stmt: &Rc<Stmt>) -> Rc<Stmt> {
    match stmt.kind() {
        StmtKind::AttrStmt { node, key, value, body } => {
            let new_value = mutator.mutate_expr(value);
            let new_body = mutator.mutate_stmt(body);
            if Rc::ptr_eq(&new_value, value) && Rc::ptr_eq(&new_body, body) {
                stmt.clone()
            } else {
                Stmt::attr(node.clone(), *key, new_value, new_body)
            }
        }
        StmtKind::ProducerRealize { tensor, bounds, condition, body } => {
            let new_bounds: Vec<Range> = bounds
                .iter()
                .map(|r| Range::from_min_extent(mutator.mutate_expr(&r.min), mutator.mutate_expr(&r.extent)))
                .collect();
            let new_condition = mutator.mutate_expr(condition);
            let new_body = mutator.mutate_stmt(body);
            let unchanged = Rc::ptr_eq(&new_condition, condition)
                && Rc::ptr_eq(&new_body, body)
                && bounds
                    .iter()
                    .zip(&new_bounds)
                    .all(|(old, new)| Rc::ptr_eq(&old.min, &new.min) && Rc::ptr_eq(&old.extent, &new.extent));
            if unchanged {
                stmt.clone()
            } else {
                Stmt::realize(tensor.clone(), new_bounds, new_condition, new_body)
            }
        }
        StmtKind::ProducerStore { tensor, value, indices } => {
            let new_value = mutator.mutate_expr(value);
            let new_indices: SmallVec<[PrimExpr; 4]> = indices.iter().map(|i| mutator.mutate_expr(i)).collect();
            let unchanged = Rc::ptr_eq(&new_value, value)
                && indices.iter().zip(&new_indices).all(|(old, new)| Rc::ptr_eq(old, new));
            if unchanged { stmt.clone() } else { Stmt::store(tensor.clone(), new_value, new_indices) }
        }
        StmtKind::For { loop_var, min, extent, kind, body } => {
            let new_min = mutator.mutate_expr(min);
            let new_extent = mutator.mutate_expr(extent);
            let new_body = mutator.mutate_stmt(body);
            if Rc::ptr_eq(&new_min, min) && Rc::ptr_eq(&new_extent, extent) && Rc::ptr_eq(&new_body, body) {
                stmt.clone()
            } else {
                Stmt::for_(loop_var.clone(), new_min, new_extent, *kind, new_body)
            }
        }
        StmtKind::Seq { stmts } => {
            let new_stmts: Vec<Rc<Stmt>> = stmts.iter().map(|s| mutator.mutate_stmt(s)).collect();
            if stmts.iter().zip(&new_stmts).all(|(old, new)| Rc::ptr_eq(old, new)) {
                stmt.clone()
            } else {
                Stmt::seq(new_stmts)
            }
        }
        StmtKind::Evaluate { value } => {
            let new_value = mutator.mutate_expr(value);
            if Rc::ptr_eq(&new_value, value) { stmt.clone() } else { Stmt::evaluate(new_value) }
        }
    }
}
