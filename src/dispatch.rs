//! Backend dispatcher for the batched GEMV primitive.
//!
//! Picks a backend once at construction (WGPU when an adapter is usable,
//! CPU otherwise) and routes launches to it. f32 work goes to the GPU when
//! one is held; every other element type runs on the CPU path.

use crate::error::LaunchResult;
use crate::ops::gemv::batched_gemv_with;
use crate::runtime_detection::{detect_backend, BackendType};
use crate::traits::{Element, Epilogue};
use crate::wgpu_kernels::WgpuBatchedGemv;

pub struct GemvDispatcher {
    backend: BackendType,
    wgpu: Option<WgpuBatchedGemv>,
}

impl GemvDispatcher {
    /// Auto-detect the backend. A GPU that probes fine but fails device
    /// initialization degrades to CPU with a warning; launch-time faults
    /// are never silently degraded.
    pub fn new() -> Self {
        match detect_backend() {
            BackendType::Wgpu => match WgpuBatchedGemv::create_default() {
                Ok(kernel) => Self {
                    backend: BackendType::Wgpu,
                    wgpu: Some(kernel),
                },
                Err(err) => {
                    log::warn!("wgpu init failed ({err}), falling back to CPU");
                    Self {
                        backend: BackendType::Cpu,
                        wgpu: None,
                    }
                }
            },
            BackendType::Cpu => Self {
                backend: BackendType::Cpu,
                wgpu: None,
            },
        }
    }

    /// Force a specific backend; fails if it cannot be initialized.
    pub fn with_backend(backend: BackendType) -> LaunchResult<Self> {
        let wgpu = match backend {
            BackendType::Wgpu => Some(WgpuBatchedGemv::create_default()?),
            BackendType::Cpu => None,
        };
        Ok(Self { backend, wgpu })
    }

    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Batched `y = epilogue(alpha * A x + beta * z)` over `batch_size`
    /// independent systems. See [`crate::ops::gemv::batched_gemv`] for the
    /// layout contract.
    #[allow(clippy::too_many_arguments)]
    pub fn batched_gemv<T: Element>(
        &self,
        y: &mut [T],
        a: &[T],
        x: &[T],
        z: Option<&[T]>,
        alpha: T,
        beta: T,
        m: usize,
        n: usize,
        batch_size: usize,
        epilogue: Epilogue,
    ) -> LaunchResult<()> {
        if let Some(kernel) = &self.wgpu {
            // as_f32_slice succeeds exactly when T == f32, so the three
            // reinterpretations either all apply or none do.
            if let (Some(a_f), Some(x_f)) = (T::as_f32_slice(a), T::as_f32_slice(x)) {
                let z_f = z.and_then(T::as_f32_slice);
                if let Some(y_f) = T::as_f32_slice_mut(y) {
                    return kernel.forward(
                        y_f,
                        a_f,
                        x_f,
                        z_f,
                        alpha.to_f32(),
                        beta.to_f32(),
                        m,
                        n,
                        batch_size,
                        epilogue,
                    );
                }
            }
        }
        batched_gemv_with(y, a, x, z, alpha, beta, m, n, batch_size, |v, idx| {
            epilogue.apply(v, idx)
        })
    }
}

impl Default for GemvDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
