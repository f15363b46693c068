//! WGPU realization of the batched GEMV execution-group model.

mod gemv;

pub use gemv::WgpuBatchedGemv;
