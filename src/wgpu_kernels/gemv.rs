//! Batched GEMV on the WGPU backend.
//!
//! One workgroup per batch element; the WGSL kernel carries the barrier and
//! shared-scratch semantics of the execution-group model. Vectorization
//! widths become pipeline override constants, with specialized pipelines
//! cached per `(vec_ax, vec_y)` pair.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use wgpu::util::DeviceExt;

use crate::error::{LaunchError, LaunchResult};
use crate::ops::gemv::validate;
use crate::traits::Epilogue;
use crate::vectorized::vec_len;

const SHADER_SOURCE: &str = include_str!("kernels/batched_gemv.wgsl");
const ENTRY_POINT: &str = "batched_gemv_main";

/// Lanes per workgroup; must match `TPB` in the shader.
pub const TPB: u32 = 256;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GemvParams {
    m: u32,
    n: u32,
    batch_size: u32,
    has_z: u32,
    epilogue: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    alpha: f32,
    beta: f32,
    _pad3: f32,
    _pad4: f32,
}

/// Batched GEMV WGPU kernel wrapper.
pub struct WgpuBatchedGemv {
    device: wgpu::Device,
    queue: wgpu::Queue,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Mutex<HashMap<(u32, u32), Arc<wgpu::ComputePipeline>>>,
}

impl WgpuBatchedGemv {
    /// Wrap an existing device/queue pair.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("batched_gemv.wgsl"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER_SOURCE)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Batched GEMV Bind Group Layout"),
            entries: &[
                uniform_layout_entry(0),
                storage_layout_entry(1, true),
                storage_layout_entry(2, true),
                storage_layout_entry(3, true),
                storage_layout_entry(4, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Batched GEMV Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            device,
            queue,
            shader,
            pipeline_layout,
            bind_group_layout,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Create the kernel with a newly initialized device.
    pub fn create_default() -> LaunchResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| LaunchError::BackendUnavailable(format!("no compatible adapter: {err}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("gemv-kernels"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|err| LaunchError::Wgpu(format!("request_device failed: {err}")))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Pipeline specialized for one `(vec_ax, vec_y)` width pair, cached
    /// after first use.
    fn pipeline_for(&self, vec_ax: u32, vec_y: u32) -> Arc<wgpu::ComputePipeline> {
        let mut cache = self
            .pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache
            .entry((vec_ax, vec_y))
            .or_insert_with(|| {
                log::debug!("specializing batched GEMV pipeline for widths ({vec_ax}, {vec_y})");
                let constants = [
                    ("VEC_LEN_AX", vec_ax as f64),
                    ("VEC_LEN_Y", vec_y as f64),
                ];
                Arc::new(
                    self.device
                        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                            label: Some("Batched GEMV Pipeline"),
                            layout: Some(&self.pipeline_layout),
                            module: &self.shader,
                            entry_point: Some(ENTRY_POINT),
                            cache: None,
                            compilation_options: wgpu::PipelineCompilationOptions {
                                constants: &constants,
                                zero_initialize_workgroup_memory: true,
                            },
                        }),
                )
            })
            .clone()
    }

    /// Batched `y = epilogue(alpha * A x + beta * z)` for f32 inputs.
    ///
    /// Submits one kernel launch with `batch_size` workgroups, then blocks
    /// on an explicit synchronization; faults the backend reports
    /// asynchronously surface here as [`LaunchError::Wgpu`].
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &self,
        y: &mut [f32],
        a: &[f32],
        x: &[f32],
        z: Option<&[f32]>,
        alpha: f32,
        beta: f32,
        m: usize,
        n: usize,
        batch_size: usize,
        epilogue: Epilogue,
    ) -> LaunchResult<()> {
        validate(
            y.len(),
            a.len(),
            x.len(),
            z.map(<[f32]>::len),
            beta == 0.0,
            m,
            n,
            batch_size,
        )?;

        let vec_ax = vec_len::<f32>(n);
        let vec_y = vec_len::<f32>(m);
        let lanes = n.div_ceil(vec_ax);
        if lanes > TPB as usize {
            return Err(LaunchError::TooManyLanes {
                required: lanes,
                limit: TPB as usize,
            });
        }
        let max_groups = self.device.limits().max_compute_workgroups_per_dimension as usize;
        if batch_size > max_groups {
            return Err(LaunchError::InvalidConfig(format!(
                "batch_size {batch_size} exceeds the device group limit {max_groups}"
            )));
        }

        let pipeline = self.pipeline_for(vec_ax as u32, vec_y as u32);

        let param_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Batched GEMV Params"),
                contents: bytemuck::bytes_of(&GemvParams {
                    m: m as u32,
                    n: n as u32,
                    batch_size: batch_size as u32,
                    has_z: z.is_some() as u32,
                    epilogue: epilogue.shader_id(),
                    _pad0: 0,
                    _pad1: 0,
                    _pad2: 0,
                    alpha,
                    beta,
                    _pad3: 0.0,
                    _pad4: 0.0,
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let a_buf = self.storage_buffer("Batched GEMV A", bytemuck::cast_slice(a));
        let x_buf = self.storage_buffer("Batched GEMV x", bytemuck::cast_slice(x));
        // z is bound but flagged absent via has_z; the shader never reads
        // the placeholder.
        let z_buf = match z {
            Some(z) => self.storage_buffer("Batched GEMV z", bytemuck::cast_slice(z)),
            None => self.storage_buffer("Batched GEMV z placeholder", &[0u8; 16]),
        };

        let y_bytes = (y.len() * std::mem::size_of::<f32>()) as u64;
        let y_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Batched GEMV y"),
            size: y_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Batched GEMV Staging"),
            size: y_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Batched GEMV Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: param_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: a_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: x_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: z_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: y_buf.as_entire_binding(),
                },
            ],
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Batched GEMV Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Batched GEMV Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(batch_size as u32, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&y_buf, 0, &staging, 0, y_bytes);
        self.queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(LaunchError::Wgpu(format!("launch rejected: {err}")));
        }

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| LaunchError::Wgpu(format!("device poll failed: {err:?}")))?;
        rx.recv()
            .map_err(|_| LaunchError::Wgpu("readback callback dropped".into()))?
            .map_err(|err| LaunchError::Wgpu(format!("readback map failed: {err:?}")))?;

        {
            let data = slice.get_mapped_range();
            y.copy_from_slice(bytemuck::cast_slice(&data));
        }
        staging.unmap();
        Ok(())
    }

    fn storage_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE,
            })
    }
}

fn uniform_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_layout_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
