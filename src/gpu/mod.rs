//! GPU Acceleration Module
//!
//! Everything device-side: context/device management, the flat tree arena,
//! the WGSL stage kernels and the orchestrating engine. The pipeline runs
//! Selection, Expansion, Playout and Backup as four separate dispatches per
//! step; that total stage ordering, plus one-workgroup-per-tree ownership
//! inside each stage, is what lets every kernel mutate shared tree state
//! without a single atomic operation.

pub mod arena;
pub mod context;
pub mod engine;
pub mod shaders;

pub use arena::{ArenaPlan, DeviceArena};
pub use context::GpuContext;
pub use engine::GpuMcts;
