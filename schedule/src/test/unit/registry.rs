use std::rc::Rc;

use tessera_ir::Stmt;

use crate::compute::Schedule;
use crate::registry::{self, TENSOR_CORE_REWRITE};
use crate::tensor_core::ExternBufferMap;
use crate::test::helpers::{MatmulConfig, build_matmul, with_cuda_target};

#[test]
fn tensor_core_pass_is_preregistered() {
    let pass = registry::get(TENSOR_CORE_REWRITE).expect("built-in pass must be registered");

    // Without the pragma the pass declines and hands the input back.
    let program = build_matmul(&MatmulConfig { pragma: false, ..MatmulConfig::default() });
    let out = with_cuda_target(|| pass(&program.stmt, &program.schedule, &program.extern_buffer));
    assert!(Rc::ptr_eq(&out, &program.stmt));
}

#[test]
fn unknown_names_resolve_to_none() {
    assert!(registry::get("schedule.NoSuchPass").is_none());
}

#[test]
fn passes_can_be_registered_and_looked_up() {
    fn noop(stmt: &Rc<Stmt>, _schedule: &Schedule, _extern_buffer: &ExternBufferMap) -> Rc<Stmt> {
        stmt.clone()
    }
    registry::register("test.Noop", noop);
    assert!(registry::get("test.Noop").is_some());
}
