use std::rc::Rc;

use tessera_dtype::DType;

use crate::expr::{Expr, ExprKind, PrimExpr, VarNode};
use crate::mutate::{ExprMutator, StmtMutator, remap_expr};
use crate::stmt::{ForKind, Stmt, StmtKind, TensorNode};

/// Mutator that changes nothing; the default remapping must return the
/// original nodes untouched.
struct Identity;

impl ExprMutator for Identity {}
impl StmtMutator for Identity {}

/// Replaces every variable named `target` with zero.
struct ZeroVar<'a> {
    target: &'a str,
}

impl ExprMutator for ZeroVar<'_> {
    fn mutate_expr(&mut self, expr: &PrimExpr) -> PrimExpr {
        if let ExprKind::Var(var) = expr.kind()
            && var.name_hint() == self.target
        {
            return Expr::int(expr.dtype(), 0);
        }
        remap_expr(self, expr)
    }
}

impl StmtMutator for ZeroVar<'_> {}

fn sample_nest() -> Rc<Stmt> {
    let c = TensorNode::new("C", DType::Float32);
    let i = VarNode::new("i", DType::Int32);
    let t = VarNode::new("threadIdx.x", DType::Int32);
    let index = Expr::add(Expr::var(t), Expr::var(i.clone()));
    let store = Stmt::store(c, Expr::float32(0.0), vec![index]);
    Stmt::for_(i, Expr::int32(0), Expr::int32(8), ForKind::Serial, store)
}

#[test]
fn identity_mutation_preserves_node_identity() {
    let nest = sample_nest();
    let remapped = Identity.mutate_stmt(&nest);
    assert!(Rc::ptr_eq(&nest, &remapped));
}

#[test]
fn substitution_rebuilds_only_the_affected_spine() {
    let nest = sample_nest();
    let rewritten = ZeroVar { target: "threadIdx.x" }.mutate_stmt(&nest);
    assert!(!Rc::ptr_eq(&nest, &rewritten));

    let StmtKind::For { body, .. } = rewritten.kind() else {
        panic!("loop structure must survive");
    };
    let StmtKind::ProducerStore { indices, .. } = body.kind() else {
        panic!("store must survive");
    };
    let (a, _) = indices[0].as_add().expect("index stays an addition");
    assert_eq!(a.as_int_imm(), Some(0));
}

#[test]
fn untargeted_subtrees_are_shared() {
    let nest = sample_nest();
    let rewritten = ZeroVar { target: "no-such-var" }.mutate_stmt(&nest);
    assert!(Rc::ptr_eq(&nest, &rewritten));
}
