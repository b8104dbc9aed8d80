//! wgpu backend.
//!
//! Maps the GL-shaped [`GpuDevice`] vocabulary onto wgpu 0.19:
//!
//! - programs become compute or render pipelines
//! - each render draw snapshots its program's uniform block into a ring
//!   buffer and binds it with a dynamic offset, so a block set between two
//!   draws never leaks into the earlier one
//! - `PointSprites` are instanced quads (6 vertices per record); wgpu
//!   points are always one pixel wide
//! - compute dispatches are encoded immediately and held until the memory
//!   barrier submits them; queue order makes the writes visible to every
//!   later render submission
//! - shader and pipeline validation runs inside error scopes; anything that
//!   escapes a scope is stored and reported by the next checked call
//!
//! Frames render into a target the host sets before `end_frame` (usually
//! the current surface texture).

use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::capture::Bitmap;
use crate::error::{DissolveError, DissolveResult, ShaderStage};

use super::{
    BlendFactor, BlendMode, BlendOp, BufferId, BufferUsage, GlobalState, GpuCapabilities,
    GpuDevice, MemoryBarrier, Primitive, ProgramDesc, ProgramId, ProgramKind, TextureId,
    VertexArrayId, VertexLayout,
};

/// Initial uniform ring size; grows to the next power of two on demand.
const UNIFORM_RING_INITIAL: u64 = 64 * 1024;

/// Vertices emitted per point sprite.
const SPRITE_QUAD_VERTICES: u32 = 6;

enum Pipeline {
    Compute {
        pipeline: wgpu::ComputePipeline,
        bind_layout: wgpu::BindGroupLayout,
    },
    Render {
        pipeline: wgpu::RenderPipeline,
        uniform_layout: wgpu::BindGroupLayout,
        uniform_group: wgpu::BindGroup,
        primitive: Primitive,
        textured: bool,
    },
}

struct ProgramSlot {
    label: &'static str,
    uniforms: Vec<u8>,
    pipeline: Pipeline,
}

struct BufferSlot {
    buffer: wgpu::Buffer,
    size: u64,
}

struct TextureSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampled: wgpu::BindGroup,
}

struct FrameDraw {
    program: ProgramId,
    buffer: BufferId,
    texture: Option<TextureId>,
    uniform_offset: u32,
    vertices: Range<u32>,
    instances: Range<u32>,
}

struct RenderTarget {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// [`GpuDevice`] backed by a wgpu device and queue.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: GpuCapabilities,
    target_format: wgpu::TextureFormat,
    target: Option<RenderTarget>,
    global: GlobalState,
    viewport: (u32, u32),
    sampler: wgpu::Sampler,
    texture_layout: wgpu::BindGroupLayout,
    uniform_alignment: u64,
    uniform_ring: wgpu::Buffer,
    uniform_ring_size: u64,
    uniform_staging: Vec<u8>,
    frame_draws: Vec<FrameDraw>,
    pending_compute: Vec<wgpu::CommandBuffer>,
    next_raw: u32,
    programs: HashMap<ProgramId, ProgramSlot>,
    buffers: HashMap<BufferId, BufferSlot>,
    textures: HashMap<TextureId, TextureSlot>,
    vertex_arrays: HashMap<VertexArrayId, (BufferId, VertexLayout)>,
    storage: HashMap<u32, BufferId>,
    current_program: Option<ProgramId>,
    current_vertex_array: Option<VertexArrayId>,
    current_texture: Option<TextureId>,
    in_frame: bool,
    uncaptured: Arc<Mutex<Option<String>>>,
}

impl WgpuDevice {
    /// Requests a device from `adapter` and wraps it.
    ///
    /// Adapters without compute support still get a device (with WebGL2
    /// limits) so the renderer can report `UnsupportedPlatform` at init.
    ///
    /// # Errors
    ///
    /// `GpuCall` when the adapter refuses the device request.
    pub fn from_adapter(
        adapter: &wgpu::Adapter,
        target_format: wgpu::TextureFormat,
    ) -> DissolveResult<Self> {
        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        let compute_shaders = downlevel
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
        let base_limits = if compute_shaders {
            wgpu::Limits::downlevel_defaults()
        } else {
            wgpu::Limits::downlevel_webgl2_defaults()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Dissolve Device"),
                required_features: wgpu::Features::empty(),
                required_limits: base_limits.using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| DissolveError::gpu_call("request_device", e.to_string()))?;

        info!(
            adapter = %info.name,
            backend = ?info.backend,
            compute_shaders,
            "wgpu device ready"
        );

        let capabilities = GpuCapabilities {
            backend: format!("{:?}", info.backend),
            api_version: None,
            compute_shaders,
        };
        Ok(Self::new(device, queue, capabilities, target_format))
    }

    /// Wraps an existing device and queue.
    #[must_use]
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        capabilities: GpuCapabilities,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let uncaptured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&uncaptured);
        device.on_uncaptured_error(Box::new(move |error: wgpu::Error| {
            let mut stored = slot.lock();
            if stored.is_none() {
                *stored = Some(error.to_string());
            }
        }));

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Dissolve Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Dissolve Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let uniform_ring = create_uniform_ring(&device, UNIFORM_RING_INITIAL);

        Self {
            device,
            queue,
            capabilities,
            target_format,
            target: None,
            global: GlobalState {
                clear_color: [0.0; 4],
                blend: BlendMode::AlphaBlend,
            },
            viewport: (0, 0),
            sampler,
            texture_layout,
            uniform_alignment,
            uniform_ring,
            uniform_ring_size: UNIFORM_RING_INITIAL,
            uniform_staging: Vec::new(),
            frame_draws: Vec::new(),
            pending_compute: Vec::new(),
            next_raw: 1,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            vertex_arrays: HashMap::new(),
            storage: HashMap::new(),
            current_program: None,
            current_vertex_array: None,
            current_texture: None,
            in_frame: false,
            uncaptured,
        }
    }

    /// Sets the texture the next `end_frame` renders into.
    pub fn set_target(&mut self, view: wgpu::TextureView, width: u32, height: u32) {
        self.target = Some(RenderTarget {
            view,
            width,
            height,
        });
    }

    /// Drops the current render target.
    pub fn clear_target(&mut self) {
        self.target = None;
    }

    /// The wrapped wgpu device, for surface configuration.
    #[must_use]
    pub fn raw_device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Format every render pipeline targets.
    #[must_use]
    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    fn allocate_raw(&mut self) -> u32 {
        let raw = self.next_raw;
        self.next_raw += 1;
        raw
    }

    fn take_uncaptured(&self, operation: &'static str) -> DissolveResult<()> {
        match self.uncaptured.lock().take() {
            Some(detail) => Err(DissolveError::gpu_call(operation, detail)),
            None => Ok(()),
        }
    }

    fn compile(
        &self,
        label: &'static str,
        stage: ShaderStage,
        source: &str,
    ) -> DissolveResult<wgpu::ShaderModule> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(DissolveError::ShaderCompile {
                stage,
                log: error.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn uniform_group(
        &self,
        label: &'static str,
        layout: &wgpu::BindGroupLayout,
        uniform_size: u64,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.uniform_ring,
                    offset: 0,
                    size: NonZeroU64::new(uniform_size),
                }),
            }],
        })
    }

    fn build_compute(
        &self,
        label: &'static str,
        uniform_size: u64,
        source: &str,
    ) -> DissolveResult<Pipeline> {
        let module = self.compile(label, ShaderStage::Compute, source)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: NonZeroU64::new(uniform_size),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                module: &module,
                entry_point: "main",
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DissolveError::ProgramLink {
                program: label,
                log: error.to_string(),
            });
        }
        Ok(Pipeline::Compute {
            pipeline,
            bind_layout,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn build_render(
        &self,
        label: &'static str,
        uniform_size: u64,
        vertex: &str,
        fragment: &str,
        layout: VertexLayout,
        primitive: Primitive,
        textured: bool,
    ) -> DissolveResult<Pipeline> {
        let vertex_module = self.compile(label, ShaderStage::Vertex, vertex)?;
        let fragment_module = self.compile(label, ShaderStage::Fragment, fragment)?;
        let attributes = vertex_attributes(label, layout)?;
        let (topology, step_mode) = match primitive {
            Primitive::PointSprites => (
                wgpu::PrimitiveTopology::TriangleList,
                wgpu::VertexStepMode::Instance,
            ),
            Primitive::TriangleStrip => (
                wgpu::PrimitiveTopology::TriangleStrip,
                wgpu::VertexStepMode::Vertex,
            ),
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(uniform_size),
                    },
                    count: None,
                }],
            });
        let mut bind_group_layouts = vec![&uniform_layout];
        if textured {
            bind_group_layouts.push(&self.texture_layout);
        }
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: "main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: layout.stride,
                        step_mode,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: "main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: Some(blend_state(self.global.blend)),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        let uniform_group = self.uniform_group(label, &uniform_layout, uniform_size);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DissolveError::ProgramLink {
                program: label,
                log: error.to_string(),
            });
        }
        Ok(Pipeline::Render {
            pipeline,
            uniform_layout,
            uniform_group,
            primitive,
            textured,
        })
    }

    fn ensure_uniform_ring(&mut self, needed: u64) {
        if needed <= self.uniform_ring_size {
            return;
        }
        let size = needed.next_power_of_two();
        debug!(from = self.uniform_ring_size, to = size, "growing uniform ring");
        self.uniform_ring.destroy();
        self.uniform_ring = create_uniform_ring(&self.device, size);
        self.uniform_ring_size = size;

        let rebuilt: Vec<(ProgramId, wgpu::BindGroup)> = self
            .programs
            .iter()
            .filter_map(|(id, slot)| match &slot.pipeline {
                Pipeline::Render { uniform_layout, .. } => Some((
                    *id,
                    self.uniform_group(slot.label, uniform_layout, slot.uniforms.len() as u64),
                )),
                Pipeline::Compute { .. } => None,
            })
            .collect();
        for (id, group) in rebuilt {
            if let Some(ProgramSlot {
                pipeline: Pipeline::Render { uniform_group, .. },
                ..
            }) = self.programs.get_mut(&id)
            {
                *uniform_group = group;
            }
        }
    }

    fn encode_frame(&self, draws: &[FrameDraw]) -> DissolveResult<Option<wgpu::CommandBuffer>> {
        let Some(target) = &self.target else {
            debug!(draws = draws.len(), "no render target, frame skipped");
            return Ok(None);
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Dissolve Frame Encoder"),
            });
        {
            let [r, g, b, a] = self.global.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Dissolve Frame"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r),
                            g: f64::from(g),
                            b: f64::from(b),
                            a: f64::from(a),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let width = self.viewport.0.min(target.width);
            let height = self.viewport.1.min(target.height);
            if width > 0 && height > 0 {
                pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            }

            for draw in draws {
                let program = self
                    .programs
                    .get(&draw.program)
                    .ok_or_else(|| DissolveError::gpu_call("end_frame", "program released mid-frame"))?;
                let Pipeline::Render {
                    pipeline,
                    uniform_group,
                    ..
                } = &program.pipeline
                else {
                    return Err(DissolveError::gpu_call("end_frame", "compute program in draw"));
                };
                let buffer = self
                    .buffers
                    .get(&draw.buffer)
                    .ok_or_else(|| DissolveError::gpu_call("end_frame", "buffer released mid-frame"))?;

                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, uniform_group, &[draw.uniform_offset]);
                if let Some(texture) = draw.texture {
                    let slot = self.textures.get(&texture).ok_or_else(|| {
                        DissolveError::gpu_call("end_frame", "texture released mid-frame")
                    })?;
                    pass.set_bind_group(1, &slot.sampled, &[]);
                }
                pass.set_vertex_buffer(0, buffer.buffer.slice(..));
                pass.draw(draw.vertices.clone(), draw.instances.clone());
            }
        }
        Ok(Some(encoder.finish()))
    }
}

fn create_uniform_ring(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Dissolve Uniform Ring"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn align_to(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

fn vertex_attributes(
    label: &'static str,
    layout: VertexLayout,
) -> DissolveResult<Vec<wgpu::VertexAttribute>> {
    layout
        .attributes
        .iter()
        .map(|attribute| {
            let format = match attribute.components {
                1 => wgpu::VertexFormat::Float32,
                2 => wgpu::VertexFormat::Float32x2,
                3 => wgpu::VertexFormat::Float32x3,
                4 => wgpu::VertexFormat::Float32x4,
                other => {
                    return Err(DissolveError::ProgramLink {
                        program: label,
                        log: format!("attribute {} has {other} components", attribute.location),
                    })
                }
            };
            Ok(wgpu::VertexAttribute {
                format,
                offset: attribute.offset,
                shader_location: attribute.location,
            })
        })
        .collect()
}

const fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

const fn blend_operation(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
    }
}

const fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let config = mode.blend_state();
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(config.color_src),
            dst_factor: blend_factor(config.color_dst),
            operation: blend_operation(config.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(config.alpha_src),
            dst_factor: blend_factor(config.alpha_dst),
            operation: blend_operation(config.alpha_op),
        },
    }
}

impl GpuDevice for WgpuDevice {
    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities.clone()
    }

    fn set_global_state(&mut self, state: GlobalState) -> DissolveResult<()> {
        self.global = state;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> DissolveResult<()> {
        self.viewport = (width, height);
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> DissolveResult<ProgramId> {
        self.take_uncaptured("create_program")?;
        let pipeline = match desc.kind {
            ProgramKind::Compute { source } => {
                self.build_compute(desc.label, desc.uniform_size, source)?
            }
            ProgramKind::Render {
                vertex,
                fragment,
                layout,
                primitive,
                textured,
            } => self.build_render(
                desc.label,
                desc.uniform_size,
                vertex,
                fragment,
                layout,
                primitive,
                textured,
            )?,
        };
        let uniform_len = usize::try_from(desc.uniform_size)
            .map_err(|e| DissolveError::gpu_call("create_program", e.to_string()))?;
        let program = ProgramId::from_raw(self.allocate_raw());
        self.programs.insert(
            program,
            ProgramSlot {
                label: desc.label,
                uniforms: vec![0; uniform_len],
                pipeline,
            },
        );
        debug!(label = desc.label, ?program, "program created");
        Ok(program)
    }

    fn use_program(&mut self, program: ProgramId) -> DissolveResult<()> {
        if !self.programs.contains_key(&program) {
            return Err(DissolveError::gpu_call(
                "use_program",
                format!("unknown program {program:?}"),
            ));
        }
        self.current_program = Some(program);
        Ok(())
    }

    fn set_uniforms(&mut self, program: ProgramId, block: &[u8]) -> DissolveResult<()> {
        let slot = self.programs.get_mut(&program).ok_or_else(|| {
            DissolveError::gpu_call("set_uniforms", format!("unknown program {program:?}"))
        })?;
        if slot.uniforms.len() != block.len() {
            return Err(DissolveError::gpu_call(
                "set_uniforms",
                format!("{} expects {} bytes, got {}", slot.label, slot.uniforms.len(), block.len()),
            ));
        }
        slot.uniforms.copy_from_slice(block);
        Ok(())
    }

    fn release_program(&mut self, program: ProgramId) -> DissolveResult<()> {
        self.programs.remove(&program).ok_or_else(|| {
            DissolveError::gpu_call("release_program", format!("unknown program {program:?}"))
        })?;
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        Ok(())
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> DissolveResult<BufferId> {
        let usages = match usage {
            BufferUsage::Particles => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
            BufferUsage::Vertices => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(match usage {
                BufferUsage::Particles => "Dissolve Particles",
                BufferUsage::Vertices => "Dissolve Sprite Vertices",
            }),
            size,
            usage: usages,
            mapped_at_creation: false,
        });
        self.take_uncaptured("create_buffer")?;
        let id = BufferId::from_raw(self.allocate_raw());
        self.buffers.insert(id, BufferSlot { buffer, size });
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> DissolveResult<()> {
        let slot = self.buffers.get(&buffer).ok_or_else(|| {
            DissolveError::gpu_call("write_buffer", format!("unknown buffer {buffer:?}"))
        })?;
        if offset + data.len() as u64 > slot.size {
            return Err(DissolveError::gpu_call(
                "write_buffer",
                format!("write of {} bytes at {offset} overflows {}", data.len(), slot.size),
            ));
        }
        self.queue.write_buffer(&slot.buffer, offset, data);
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) -> DissolveResult<()> {
        let slot = self.buffers.remove(&buffer).ok_or_else(|| {
            DissolveError::gpu_call("release_buffer", format!("unknown buffer {buffer:?}"))
        })?;
        slot.buffer.destroy();
        self.storage.retain(|_, bound| *bound != buffer);
        Ok(())
    }

    fn create_texture(&mut self, bitmap: &Bitmap) -> DissolveResult<TextureId> {
        let size = wgpu::Extent3d {
            width: bitmap.width(),
            height: bitmap.height(),
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Dissolve Source Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bitmap.pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bitmap.row_pitch()),
                rows_per_image: Some(bitmap.height()),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampled = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dissolve Source Texture"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.take_uncaptured("create_texture")?;
        let id = TextureId::from_raw(self.allocate_raw());
        self.textures.insert(
            id,
            TextureSlot {
                texture,
                view,
                sampled,
            },
        );
        Ok(id)
    }

    fn bind_texture(&mut self, texture: TextureId) -> DissolveResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(DissolveError::gpu_call(
                "bind_texture",
                format!("unknown texture {texture:?}"),
            ));
        }
        self.current_texture = Some(texture);
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) -> DissolveResult<()> {
        let slot = self.textures.remove(&texture).ok_or_else(|| {
            DissolveError::gpu_call("release_texture", format!("unknown texture {texture:?}"))
        })?;
        slot.texture.destroy();
        if self.current_texture == Some(texture) {
            self.current_texture = None;
        }
        Ok(())
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferId) -> DissolveResult<()> {
        if !self.buffers.contains_key(&buffer) {
            return Err(DissolveError::gpu_call(
                "bind_storage_buffer",
                format!("unknown buffer {buffer:?}"),
            ));
        }
        self.storage.insert(slot, buffer);
        Ok(())
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) -> DissolveResult<()> {
        let program = self
            .current_program
            .and_then(|id| self.programs.get(&id))
            .ok_or_else(|| DissolveError::gpu_call("dispatch_compute", "no program in use"))?;
        let Pipeline::Compute {
            pipeline,
            bind_layout,
        } = &program.pipeline
        else {
            return Err(DissolveError::gpu_call(
                "dispatch_compute",
                format!("{} is not a compute program", program.label),
            ));
        };
        let storage = self
            .storage
            .get(&0)
            .and_then(|id| self.buffers.get(id))
            .ok_or_else(|| DissolveError::gpu_call("dispatch_compute", "no storage at slot 0"))?;
        let texture = self
            .current_texture
            .and_then(|id| self.textures.get(&id))
            .ok_or_else(|| DissolveError::gpu_call("dispatch_compute", "no texture bound"))?;

        let uniforms = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(program.label),
                contents: &program.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.label),
            layout: bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: storage.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Dissolve Spawn Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        let commands = encoder.finish();
        self.pending_compute.push(commands);
        Ok(())
    }

    fn memory_barrier(&mut self, barrier: MemoryBarrier) -> DissolveResult<()> {
        match barrier {
            MemoryBarrier::VertexAttribArray => {
                if !self.pending_compute.is_empty() {
                    self.queue.submit(self.pending_compute.drain(..));
                }
            }
        }
        self.take_uncaptured("memory_barrier")
    }

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> DissolveResult<VertexArrayId> {
        if !self.buffers.contains_key(&buffer) {
            return Err(DissolveError::gpu_call(
                "create_vertex_array",
                format!("unknown buffer {buffer:?}"),
            ));
        }
        let id = VertexArrayId::from_raw(self.allocate_raw());
        self.vertex_arrays.insert(id, (buffer, layout));
        Ok(id)
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> DissolveResult<()> {
        if !self.vertex_arrays.contains_key(&vertex_array) {
            return Err(DissolveError::gpu_call(
                "bind_vertex_array",
                format!("unknown vertex array {vertex_array:?}"),
            ));
        }
        self.current_vertex_array = Some(vertex_array);
        Ok(())
    }

    fn release_vertex_array(&mut self, vertex_array: VertexArrayId) -> DissolveResult<()> {
        self.vertex_arrays.remove(&vertex_array).ok_or_else(|| {
            DissolveError::gpu_call(
                "release_vertex_array",
                format!("unknown vertex array {vertex_array:?}"),
            )
        })?;
        if self.current_vertex_array == Some(vertex_array) {
            self.current_vertex_array = None;
        }
        Ok(())
    }

    fn begin_frame(&mut self) -> DissolveResult<()> {
        if self.in_frame {
            return Err(DissolveError::gpu_call("begin_frame", "frame already open"));
        }
        self.uniform_staging.clear();
        self.frame_draws.clear();
        self.in_frame = true;
        Ok(())
    }

    fn draw(&mut self, primitive: Primitive, first: u32, count: u32) -> DissolveResult<()> {
        if !self.in_frame {
            return Err(DissolveError::gpu_call("draw", "no frame in progress"));
        }
        let program_id = self
            .current_program
            .ok_or_else(|| DissolveError::gpu_call("draw", "no program in use"))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or_else(|| DissolveError::gpu_call("draw", "stale program"))?;
        let Pipeline::Render {
            primitive: expected,
            textured,
            ..
        } = &program.pipeline
        else {
            return Err(DissolveError::gpu_call("draw", "compute program in use"));
        };
        if *expected != primitive {
            return Err(DissolveError::gpu_call(
                "draw",
                format!("{} draws {expected:?}, not {primitive:?}", program.label),
            ));
        }
        let texture = if *textured {
            Some(
                self.current_texture
                    .ok_or_else(|| DissolveError::gpu_call("draw", "no texture bound"))?,
            )
        } else {
            None
        };
        let (buffer, _) = self
            .current_vertex_array
            .and_then(|id| self.vertex_arrays.get(&id))
            .copied()
            .ok_or_else(|| DissolveError::gpu_call("draw", "no vertex array bound"))?;

        let offset = align_to(self.uniform_staging.len() as u64, self.uniform_alignment);
        let uniform_offset = u32::try_from(offset)
            .map_err(|_| DissolveError::gpu_call("draw", "uniform ring overflow"))?;
        let start = usize::try_from(offset)
            .map_err(|_| DissolveError::gpu_call("draw", "uniform ring overflow"))?;
        self.uniform_staging.resize(start, 0);
        self.uniform_staging.extend_from_slice(&program.uniforms);

        let end = first.saturating_add(count);
        let (vertices, instances) = match primitive {
            Primitive::PointSprites => (0..SPRITE_QUAD_VERTICES, first..end),
            Primitive::TriangleStrip => (first..end, 0..1),
        };
        self.frame_draws.push(FrameDraw {
            program: program_id,
            buffer,
            texture,
            uniform_offset,
            vertices,
            instances,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> DissolveResult<()> {
        if !self.in_frame {
            return Err(DissolveError::gpu_call("end_frame", "no frame in progress"));
        }
        self.in_frame = false;

        self.ensure_uniform_ring(self.uniform_staging.len() as u64);
        if !self.uniform_staging.is_empty() {
            self.queue
                .write_buffer(&self.uniform_ring, 0, &self.uniform_staging);
        }

        let draws = std::mem::take(&mut self.frame_draws);
        let encoded = self.encode_frame(&draws);
        self.frame_draws = draws;
        let frame = encoded?;

        self.queue
            .submit(self.pending_compute.drain(..).chain(frame));
        self.take_uncaptured("end_frame")
    }
}
