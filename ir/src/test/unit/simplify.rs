use std::rc::Rc;

use tessera_dtype::DType;
use test_case::test_case;

use crate::expr::{Expr, VarNode};
use crate::simplify::simplify;

#[test]
fn folds_constant_arithmetic() {
    let expr = Expr::mul(Expr::add(Expr::int32(2), Expr::int32(3)), Expr::int32(4));
    let simplified = simplify(&expr);
    assert_eq!(simplified.as_int_imm(), Some(20));
}

#[test_case(-7, 2, -4 ; "negative dividend floors toward negative infinity")]
#[test_case(7, 2, 3 ; "positive operands truncate and floor alike")]
fn floor_division(a: i64, b: i64, expected: i64) {
    let expr = Expr::floordiv(Expr::int32(a), Expr::int32(b));
    assert_eq!(simplify(&expr).as_int_imm(), Some(expected));
}

#[test]
fn floor_modulo_is_non_negative_for_positive_divisor() {
    let expr = Expr::floormod(Expr::int32(-7), Expr::int32(2));
    assert_eq!(simplify(&expr).as_int_imm(), Some(1));
}

#[test]
fn additive_identity_returns_the_other_operand() {
    let x = Expr::var(VarNode::new("x", DType::Int32));
    let expr = Expr::add(x.clone(), Expr::int32(0));
    let simplified = simplify(&expr);
    assert!(Rc::ptr_eq(&simplified, &x));
}

#[test]
fn multiplicative_identities() {
    let x = Expr::var(VarNode::new("x", DType::Int32));
    assert!(Rc::ptr_eq(&simplify(&Expr::mul(x.clone(), Expr::int32(1))), &x));
    assert!(Rc::ptr_eq(&simplify(&Expr::mul(Expr::int32(1), x.clone())), &x));
    assert_eq!(simplify(&Expr::mul(x.clone(), Expr::int32(0))).as_int_imm(), Some(0));
}

#[test]
fn division_by_one_and_modulo_one() {
    let x = Expr::var(VarNode::new("x", DType::Int32));
    assert!(Rc::ptr_eq(&simplify(&Expr::floordiv(x.clone(), Expr::int32(1))), &x));
    assert_eq!(simplify(&Expr::floormod(x, Expr::int32(1))).as_int_imm(), Some(0));
}

#[test]
fn nested_identities_collapse() {
    let x = Expr::var(VarNode::new("x", DType::Int32));
    let expr = Expr::add(Expr::mul(x.clone(), Expr::int32(1)), Expr::int32(0));
    assert!(Rc::ptr_eq(&simplify(&expr), &x));
}

#[test]
fn untouched_tree_keeps_its_identity() {
    let x = Expr::var(VarNode::new("x", DType::Int32));
    let y = Expr::var(VarNode::new("y", DType::Int32));
    let expr = Expr::add(x, y);
    let simplified = simplify(&expr);
    assert!(Rc::ptr_eq(&simplified, &expr));
}

#[test]
fn division_by_zero_is_left_unfolded() {
    let expr = Expr::floordiv(Expr::int32(1), Expr::int32(0));
    let simplified = simplify(&expr);
    assert!(simplified.as_int_imm().is_none());
}
