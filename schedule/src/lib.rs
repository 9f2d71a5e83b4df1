//! Scheduling layer of the Tessera compiler.
//!
//! This crate owns what happens after schedule lowering has produced a
//! statement tree: the schedule summary handed to post-processing passes,
//! the compilation-target and device-runtime gates, the global pass
//! registry, and the passes themselves.
//!
//! # Module Organization
//!
//! - [`compute`] - compute-op and schedule summary consumed by passes
//! - [`target`] - current compilation target and device-runtime probes
//! - [`registry`] - global name → pass table
//! - [`tensor_core`] - warp-level tensor-core rewrite of matmul programs

pub mod compute;
pub mod registry;
pub mod target;
pub mod tensor_core;

#[cfg(test)]
pub mod test;

pub use compute::{ComputeOp, Schedule};
pub use registry::{PassFn, TENSOR_CORE_REWRITE};
pub use target::{DeviceApi, DeviceKind, Target, TargetKind, device_api, register_device_api};
pub use tensor_core::{ExternBufferMap, MatrixMajor, MatrixRole, Tile, rewrite_for_tensor_core};
