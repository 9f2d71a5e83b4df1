use tessera_dtype::DType;

use crate::expr::{Expr, ExprKind, PrimExpr, VarNode};
use crate::stmt::{ForKind, Stmt, TensorNode};
use crate::visit::{ExprVisitor, StmtVisitor, walk_expr, walk_stmt};

#[derive(Default)]
struct Census {
    vars: Vec<String>,
    loads: usize,
    stores: usize,
}

impl ExprVisitor for Census {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        match expr.kind() {
            ExprKind::Var(var) => self.vars.push(var.name_hint().to_string()),
            ExprKind::ProducerLoad { .. } => {
                self.loads += 1;
                walk_expr(self, expr);
            }
            _ => walk_expr(self, expr),
        }
    }
}

impl StmtVisitor for Census {
    fn visit_stmt(&mut self, stmt: &std::rc::Rc<Stmt>) {
        if matches!(stmt.kind(), crate::stmt::StmtKind::ProducerStore { .. }) {
            self.stores += 1;
        }
        walk_stmt(self, stmt);
    }
}

#[test]
fn traversal_reaches_store_operands() {
    let a = TensorNode::new("A", DType::Float16);
    let c = TensorNode::new("C", DType::Float32);
    let i = VarNode::new("i", DType::Int32);
    let j = VarNode::new("j", DType::Int32);

    let load = Expr::producer_load(a, vec![Expr::var(i.clone()), Expr::var(j.clone())]).unwrap();
    let value = Expr::cast(load, DType::Float32);
    let store = Stmt::store(c, value, vec![Expr::var(i.clone()), Expr::var(j.clone())]);
    let nest = Stmt::for_(
        j,
        Expr::int32(0),
        Expr::int32(16),
        ForKind::Serial,
        Stmt::for_(i, Expr::int32(0), Expr::int32(16), ForKind::Serial, store),
    );

    let mut census = Census::default();
    census.visit_stmt(&nest);

    assert_eq!(census.stores, 1);
    assert_eq!(census.loads, 1);
    // Two loop vars in the load indices plus two in the store indices.
    assert_eq!(census.vars.iter().filter(|v| *v == "i").count(), 2);
    assert_eq!(census.vars.iter().filter(|v| *v == "j").count(), 2);
}
