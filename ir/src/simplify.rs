//! Arithmetic canonicalization of index expressions.
//!
//! A deliberately small bottom-up folder: constant arithmetic plus the
//! additive/multiplicative identities. Index expressions fed to it are
//! integer-typed; anything it does not understand is returned untouched, so
//! callers can apply it unconditionally.

use std::rc::Rc;

use crate::expr::{Expr, ExprKind, PrimExpr};

#[derive(Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn is_zero(expr: &PrimExpr) -> bool {
    expr.as_int_imm() == Some(0)
}

fn is_one(expr: &PrimExpr) -> bool {
    expr.as_int_imm() == Some(1)
}

/// Simplify `expr`, returning the input node when nothing changed.
pub fn simplify(expr: &PrimExpr) -> PrimExpr {
    match expr.kind() {
        ExprKind::Cast { value } => {
            let new_value = simplify(value);
            if Rc::ptr_eq(&new_value, value) { expr.clone() } else { Expr::cast(new_value, expr.dtype()) }
        }
        ExprKind::Add { a, b } => fold(expr, BinOp::Add, a, b),
        ExprKind::Sub { a, b } => fold(expr, BinOp::Sub, a, b),
        ExprKind::Mul { a, b } => fold(expr, BinOp::Mul, a, b),
        ExprKind::FloorDiv { a, b } => fold(expr, BinOp::Div, a, b),
        ExprKind::FloorMod { a, b } => fold(expr, BinOp::Mod, a, b),
        _ => expr.clone(),
    }
}

fn fold(expr: &PrimExpr, op: BinOp, a: &PrimExpr, b: &PrimExpr) -> PrimExpr {
    let sa = simplify(a);
    let sb = simplify(b);

    // Constant arithmetic. Division and modulo floor toward negative
    // infinity; a zero divisor or an overflow leaves the node unfolded.
    if let (Some(x), Some(y)) = (sa.as_int_imm(), sb.as_int_imm()) {
        let value = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div => x.checked_div_euclid(y),
            BinOp::Mod => x.checked_rem_euclid(y),
        };
        if let Some(value) = value {
            return Expr::int(expr.dtype(), value);
        }
    }

    match op {
        BinOp::Add if is_zero(&sa) => return sb,
        BinOp::Add if is_zero(&sb) => return sa,
        BinOp::Sub if is_zero(&sb) => return sa,
        BinOp::Mul if is_one(&sa) => return sb,
        BinOp::Mul if is_one(&sb) => return sa,
        BinOp::Mul if is_zero(&sa) || is_zero(&sb) => return Expr::int(expr.dtype(), 0),
        BinOp::Div if is_one(&sb) => return sa,
        BinOp::Mod if is_one(&sb) => return Expr::int(expr.dtype(), 0),
        _ => {}
    }

    if Rc::ptr_eq(&sa, a) && Rc::ptr_eq(&sb, b) {
        expr.clone()
    } else {
        let kind = match op {
            BinOp::Add => ExprKind::Add { a: sa, b: sb },
            BinOp::Sub => ExprKind::Sub { a: sa, b: sb },
            BinOp::Mul => ExprKind::Mul { a: sa, b: sb },
            BinOp::Div => ExprKind::FloorDiv { a: sa, b: sb },
            BinOp::Mod => ExprKind::FloorMod { a: sa, b: sb },
        };
        Expr::new(kind, expr.dtype())
    }
}
