//! Stage 2: matrix role and layout classification.
//!
//! The matcher knows *that* a store multiplies two fragments into an
//! accumulator; this stage works out *which operand is which* by looking at
//! the schedule instead of the lowered tree. For every output compute op
//! shaped like a matmul (≥2 spatial axes, exactly one reduction axis), the
//! position of the reduction variable within each input's trailing access
//! indices determines the operand role and layout. The matched stores are
//! then reordered so operand 0 is always `matrix_a`.

use std::collections::{HashMap, HashSet};

use tessera_dtype::DType;
use tessera_ir::{ExprKind, ExprVisitor, NodeId, PrimExpr, walk_expr};
use tracing::debug;

use super::matching::MatchSet;
use super::{MatrixMajor, MatrixRole, simplify_name, unpack_cast};
use crate::compute::Schedule;

/// Role and layout tables plus the canonically-ordered mma records.
#[derive(Debug)]
pub(crate) struct RoleMaps {
    /// Simplified tensor name → operand role.
    pub matrix_abc: HashMap<String, MatrixRole>,
    /// Simplified tensor name → fragment layout.
    pub matrix_major: HashMap<String, MatrixMajor>,
    /// Matched store node → `[load_a, load_b, load_c]`, operand 0 is
    /// always `matrix_a`.
    pub mma_sync: HashMap<NodeId, [PrimExpr; 3]>,
    /// Buffer names known to be tensor-core fragments.
    pub frag_reg: HashSet<String>,
}

/// Collects, per input tensor name, the access indices of the loads feeding
/// a sum-of-products reduction.
#[derive(Default)]
struct BodyVisitor {
    args: HashMap<String, Vec<PrimExpr>>,
    tensorcore_candidate: bool,
}

impl ExprVisitor for BodyVisitor {
    fn visit_expr(&mut self, expr: &PrimExpr) {
        match expr.kind() {
            ExprKind::Reduce { combiner, source, .. } => {
                if combiner.result.len() != 1 || !matches!(combiner.result[0].kind(), ExprKind::Add { .. }) {
                    return;
                }
                for src in source {
                    let is_product = [DType::Float32, DType::Int32]
                        .into_iter()
                        .any(|acc| unpack_cast(src, acc).is_some_and(|e| e.as_mul().is_some()));
                    if !is_product {
                        continue;
                    }
                    self.tensorcore_candidate = true;
                    self.visit_expr(src);
                }
            }
            ExprKind::ProducerLoad { tensor, indices } => {
                walk_expr(self, expr);
                self.args.entry(tensor.name().to_string()).or_insert_with(|| indices.to_vec());
            }
            _ => walk_expr(self, expr),
        }
    }
}

/// Classify roles and canonicalize the operand order of every matched
/// store. `None` aborts the pipeline: an operand could not be classified,
/// or the pair did not come out as one `matrix_a` and one `matrix_b`.
pub(crate) fn identify(schedule: &Schedule, matched: MatchSet) -> Option<RoleMaps> {
    let mut matrix_abc: HashMap<String, MatrixRole> = HashMap::new();
    let mut matrix_major: HashMap<String, MatrixMajor> = HashMap::new();

    for compute in schedule.outputs() {
        let axis = compute.axis();
        let reduce_axis = compute.reduce_axis();
        if axis.len() < 2 || reduce_axis.len() != 1 {
            continue;
        }
        let spatial_x = &axis[axis.len() - 2].var;
        let spatial_y = &axis[axis.len() - 1].var;
        let reduction = &reduce_axis[0].var;

        let mut body_visitor = BodyVisitor::default();
        for expr in compute.body() {
            body_visitor.visit_expr(expr);
        }
        if !body_visitor.tensorcore_candidate {
            continue;
        }

        for (name, indices) in &body_visitor.args {
            if indices.len() < 2 {
                continue;
            }
            let Some(var0) = indices[indices.len() - 2].as_var() else { continue };
            let Some(var1) = indices[indices.len() - 1].as_var() else { continue };

            let classified = if var0.id() == reduction.id() && var1.id() == spatial_y.id() {
                Some((MatrixRole::MatrixA, MatrixMajor::ColMajor))
            } else if var0.id() == reduction.id() && var1.id() == spatial_x.id() {
                Some((MatrixRole::MatrixB, MatrixMajor::RowMajor))
            } else if var0.id() == spatial_y.id() && var1.id() == reduction.id() {
                Some((MatrixRole::MatrixA, MatrixMajor::RowMajor))
            } else if var0.id() == spatial_x.id() && var1.id() == reduction.id() {
                Some((MatrixRole::MatrixB, MatrixMajor::ColMajor))
            } else {
                None
            };

            if let Some((role, major)) = classified {
                matrix_abc.entry(name.clone()).or_insert(role);
                matrix_major.entry(name.clone()).or_insert(major);
            }
        }

        matrix_abc.entry(compute.name().to_string()).or_insert(MatrixRole::Accumulator);
        matrix_major.entry(compute.name().to_string()).or_insert(MatrixMajor::ColMajor);
    }

    // Canonicalize operand order: operand 0 must be matrix_a.
    let mut mma_sync = matched.mma_sync;
    for operands in mma_sync.values_mut() {
        let name_a = matched.buf_name.get(&operands[0].id())?;
        let name_b = matched.buf_name.get(&operands[1].id())?;
        let role_a = matrix_abc.get(simplify_name(name_a))?;
        let role_b = matrix_abc.get(simplify_name(name_b))?;
        match (role_a, role_b) {
            (MatrixRole::MatrixA, MatrixRole::MatrixB) => {}
            (MatrixRole::MatrixB, MatrixRole::MatrixA) => operands.swap(0, 1),
            _ => {
                debug!(%name_a, %name_b, "mma operands did not classify as one matrix_a and one matrix_b");
                return None;
            }
        }
    }

    Some(RoleMaps { matrix_abc, matrix_major, mma_sync, frag_reg: matched.frag_reg })
}
