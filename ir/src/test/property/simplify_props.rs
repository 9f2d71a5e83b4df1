use std::rc::Rc;

use proptest::prelude::*;

use crate::expr::{Expr, PrimExpr};
use crate::simplify::simplify;

/// Constant expression shape, generated instead of `PrimExpr` directly so the
/// reference evaluation can run on the same structure.
#[derive(Debug, Clone)]
enum ConstTree {
    Leaf(i64),
    Add(Box<ConstTree>, Box<ConstTree>),
    Sub(Box<ConstTree>, Box<ConstTree>),
    Mul(Box<ConstTree>, Box<ConstTree>),
    Div(Box<ConstTree>, Box<ConstTree>),
    Mod(Box<ConstTree>, Box<ConstTree>),
}

fn const_tree() -> impl Strategy<Value = ConstTree> {
    let leaf = (-100i64..100).prop_map(ConstTree::Leaf);
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| ConstTree::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| ConstTree::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| ConstTree::Mul(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| ConstTree::Div(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| ConstTree::Mod(Box::new(a), Box::new(b))),
        ]
    })
}

fn build(tree: &ConstTree) -> PrimExpr {
    match tree {
        ConstTree::Leaf(v) => Expr::int32(*v),
        ConstTree::Add(a, b) => Expr::add(build(a), build(b)),
        ConstTree::Sub(a, b) => Expr::sub(build(a), build(b)),
        ConstTree::Mul(a, b) => Expr::mul(build(a), build(b)),
        ConstTree::Div(a, b) => Expr::floordiv(build(a), build(b)),
        ConstTree::Mod(a, b) => Expr::floormod(build(a), build(b)),
    }
}

fn eval(tree: &ConstTree) -> Option<i64> {
    match tree {
        ConstTree::Leaf(v) => Some(*v),
        ConstTree::Add(a, b) => eval(a)?.checked_add(eval(b)?),
        ConstTree::Sub(a, b) => eval(a)?.checked_sub(eval(b)?),
        ConstTree::Mul(a, b) => eval(a)?.checked_mul(eval(b)?),
        ConstTree::Div(a, b) => eval(a)?.checked_div_euclid(eval(b)?),
        ConstTree::Mod(a, b) => eval(a)?.checked_rem_euclid(eval(b)?),
    }
}

proptest! {
    /// Folding never changes the value of a fully-evaluable constant tree.
    /// Trees with a division by zero are skipped; folding declines those.
    #[test]
    fn simplification_preserves_value(tree in const_tree()) {
        if let Some(expected) = eval(&tree) {
            let simplified = simplify(&build(&tree));
            prop_assert_eq!(simplified.as_int_imm(), Some(expected));
        }
    }

    /// A second pass finds nothing left to do.
    #[test]
    fn simplification_is_idempotent(tree in const_tree()) {
        let once = simplify(&build(&tree));
        let twice = simplify(&once);
        prop_assert!(Rc::ptr_eq(&once, &twice));
    }
}
