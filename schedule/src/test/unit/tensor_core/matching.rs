use tessera_dtype::DType;

use crate::tensor_core::matching;
use crate::test::helpers::{MatmulConfig, build_matmul};

#[test]
fn matches_the_canonical_store() {
    let program = build_matmul(&MatmulConfig::default());
    let set = matching::run(&program.stmt, &program.extern_buffer);

    assert!(set.matched);
    for fragment in ["A.local", "B.local", "C.local"] {
        assert!(set.frag_reg.contains(fragment), "{fragment} must be registered as a fragment");
    }
    assert_eq!(set.mma_sync.len(), 1);
    assert_eq!(set.buf_name.len(), 2);

    let operands = set.mma_sync.values().next().unwrap();
    let operand_tensor = |expr: &tessera_ir::PrimExpr| expr.as_producer_load().unwrap().0.name().to_string();
    assert_eq!(operand_tensor(&operands[0]), "A.local");
    assert_eq!(operand_tensor(&operands[1]), "B.local");
    assert_eq!(operand_tensor(&operands[2]), "C.local");
}

#[test]
fn matching_requires_the_pragma() {
    let program = build_matmul(&MatmulConfig { pragma: false, ..MatmulConfig::default() });
    let set = matching::run(&program.stmt, &program.extern_buffer);
    assert!(!set.matched);
    assert!(set.mma_sync.is_empty());
    assert!(set.frag_reg.is_empty());
}

#[test]
fn matching_requires_local_storage_scope() {
    let program = build_matmul(&MatmulConfig { fragment_scope: "shared", ..MatmulConfig::default() });
    let set = matching::run(&program.stmt, &program.extern_buffer);
    assert!(!set.matched);
}

#[test]
fn matching_requires_low_precision_inputs() {
    let program = build_matmul(&MatmulConfig { in_dtype: DType::Float32, ..MatmulConfig::default() });
    let set = matching::run(&program.stmt, &program.extern_buffer);
    assert!(!set.matched);
}

#[test]
fn matching_requires_a_32_bit_accumulator() {
    let program = build_matmul(&MatmulConfig { acc_dtype: DType::Float64, ..MatmulConfig::default() });
    let set = matching::run(&program.stmt, &program.extern_buffer);
    assert!(!set.matched);
}

#[test]
fn int8_inputs_with_int32_accumulator_match() {
    let program = build_matmul(&MatmulConfig {
        in_dtype: DType::Int8,
        acc_dtype: DType::Int32,
        ..MatmulConfig::default()
    });
    let set = matching::run(&program.stmt, &program.extern_buffer);
    assert!(set.matched);
}
