//! Runtime backend detection with in-process caching.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Wgpu,
    Cpu,
}

impl BackendType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wgpu => "WGPU",
            Self::Cpu => "CPU",
        }
    }
}

static CACHED_BACKEND: OnceLock<BackendType> = OnceLock::new();

/// Detect the best available backend. Priority: WGPU → CPU.
///
/// The `GEMV_KERNELS_BACKEND` environment variable (`"wgpu"` or `"cpu"`)
/// overrides detection. The result is cached for the process lifetime.
pub fn detect_backend() -> BackendType {
    *CACHED_BACKEND.get_or_init(|| {
        if let Ok(forced) = std::env::var("GEMV_KERNELS_BACKEND") {
            match forced.to_ascii_lowercase().as_str() {
                "cpu" => {
                    log::info!("backend forced to CPU via GEMV_KERNELS_BACKEND");
                    return BackendType::Cpu;
                }
                "wgpu" => {
                    log::info!("backend forced to WGPU via GEMV_KERNELS_BACKEND");
                    return BackendType::Wgpu;
                }
                other => {
                    log::warn!("unknown GEMV_KERNELS_BACKEND value {other:?}, detecting instead");
                }
            }
        }
        if try_wgpu() {
            log::info!("selected WGPU backend");
            BackendType::Wgpu
        } else {
            log::info!("no usable GPU adapter, selected CPU backend");
            BackendType::Cpu
        }
    })
}

fn try_wgpu() -> bool {
    let instance = wgpu::Instance::default();
    match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    })) {
        Ok(adapter) => {
            let info = adapter.get_info();
            log::debug!("wgpu adapter: {} ({:?})", info.name, info.backend);
            true
        }
        Err(err) => {
            log::debug!("wgpu adapter probe failed: {err}");
            false
        }
    }
}
