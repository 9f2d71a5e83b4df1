//! Schedule summary consumed by post-scheduling passes.
//!
//! Passes never see the scheduling decisions themselves, only their result:
//! the output compute operations with their spatial axes, reduction axes,
//! and body expressions.

use std::rc::Rc;

use tessera_ir::{IterVar, PrimExpr};

/// One compute operation of the schedule.
#[derive(Debug)]
pub struct ComputeOp {
    name: String,
    axis: Vec<IterVar>,
    reduce_axis: Vec<IterVar>,
    body: Vec<PrimExpr>,
}

impl ComputeOp {
    pub fn new(
        name: impl Into<String>,
        axis: Vec<IterVar>,
        reduce_axis: Vec<IterVar>,
        body: Vec<PrimExpr>,
    ) -> Rc<Self> {
        Rc::new(Self { name: name.into(), axis, reduce_axis, body })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spatial axes, outermost first.
    pub fn axis(&self) -> &[IterVar] {
        &self.axis
    }

    pub fn reduce_axis(&self) -> &[IterVar] {
        &self.reduce_axis
    }

    /// One expression per output of the operation.
    pub fn body(&self) -> &[PrimExpr] {
        &self.body
    }
}

/// Output stages of a fully-scheduled program.
#[derive(Debug, Default)]
pub struct Schedule {
    outputs: Vec<Rc<ComputeOp>>,
}

impl Schedule {
    pub fn new(outputs: Vec<Rc<ComputeOp>>) -> Self {
        Self { outputs }
    }

    pub fn outputs(&self) -> &[Rc<ComputeOp>] {
        &self.outputs
    }
}
