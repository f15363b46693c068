//! gemv-kernels: batched small-matrix GEMV with runtime backend selection.
//!
//! Computes `y_b = epilogue(alpha * A_b * x_b + beta * z_b)` for a batch of
//! independent systems, one execution group per batch element:
//! - **Runtime backend selection**: WGPU when an adapter is usable, CPU
//!   otherwise, with an environment override.
//! - **Width dispatch**: vectorization factors picked from a descending
//!   table of transaction byte widths, specialized per element type.
//! - **Raw slice APIs**: no tensor framework, callers own all buffers.
//!
//! This primitive targets batches of matrices small enough for one group;
//! it does no multi-group tiling and makes no guarantee about the
//! summation order inside a row.
//!
//! # Quick start
//!
//! ```
//! use gemv_kernels::batched_gemv;
//!
//! let a = vec![1.0f32, 2.0, 3.0, 4.0]; // one 2x2 matrix
//! let x = vec![1.0f32, 1.0];
//! let mut y = vec![0.0f32; 2];
//! batched_gemv(&mut y, &a, &x, None, 1.0, 0.0, 2, 2, 1).unwrap();
//! assert_eq!(y, vec![3.0, 7.0]);
//! ```

pub mod dispatch;
pub mod error;
pub mod ops;
pub mod reduce;
pub mod runtime_detection;
pub mod traits;
pub mod vectorized;
pub mod wgpu_kernels;

pub use dispatch::GemvDispatcher;
pub use error::{LaunchError, LaunchResult};
pub use ops::gemv::{batched_gemv, batched_gemv_with, MAX_LANES_PER_GROUP, MAX_SCRATCH_BYTES};
pub use reduce::{dot_product, ReduceScratch};
pub use runtime_detection::{detect_backend, BackendType};
pub use traits::{Element, Epilogue};
pub use vectorized::{vec_len, VecChunk, WIDTH_TABLE_BYTES};
pub use wgpu_kernels::WgpuBatchedGemv;
