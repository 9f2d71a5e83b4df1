//! Global registry of named post-scheduling passes.
//!
//! Frontends look passes up by name rather than linking against them
//! directly; the built-in passes are pre-registered.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tessera_ir::Stmt;

use crate::compute::Schedule;
use crate::tensor_core::{self, ExternBufferMap};

/// Post-scheduling pass: statement in, statement out.
pub type PassFn = fn(&Rc<Stmt>, &Schedule, &ExternBufferMap) -> Rc<Stmt>;

/// Registry name of the tensor-core rewrite.
pub const TENSOR_CORE_REWRITE: &str = "schedule.SchedulePostProcRewriteForTensorCore";

static PASSES: Lazy<RwLock<HashMap<&'static str, PassFn>>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, PassFn> = HashMap::new();
    table.insert(TENSOR_CORE_REWRITE, tensor_core::rewrite_for_tensor_core as PassFn);
    RwLock::new(table)
});

/// Register `pass` under `name`, replacing any previous entry.
pub fn register(name: &'static str, pass: PassFn) {
    PASSES.write().insert(name, pass);
}

/// Look up a registered pass.
pub fn get(name: &str) -> Option<PassFn> {
    PASSES.read().get(name).copied()
}
