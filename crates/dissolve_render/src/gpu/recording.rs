//! Headless recording backend.
//!
//! `RecordingDevice` validates every call the way a strict driver would and
//! keeps a log of what was issued. It backs the test suites and any host that
//! has to run the engine without a GPU.
//!
//! Validation rules:
//! - handles must be live; releasing twice is an error
//! - draws only inside `begin_frame` / `end_frame`
//! - a buffer written by compute cannot be drawn before a memory barrier
//! - draws cannot read past the end of their vertex buffer

use std::collections::HashMap;

use crate::capture::Bitmap;
use crate::error::{DissolveError, DissolveResult, ShaderStage};

use super::{
    ApiVersion, BufferId, BufferUsage, GlobalState, GpuCapabilities, GpuDevice, MemoryBarrier,
    Primitive, ProgramDesc, ProgramId, ProgramKind, TextureId, VertexArrayId, VertexLayout,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// `set_global_state`
    SetGlobalState(GlobalState),
    /// `set_viewport`
    SetViewport {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// `create_program`
    CreateProgram {
        /// New handle.
        program: ProgramId,
        /// Program label.
        label: &'static str,
    },
    /// `use_program`
    UseProgram(ProgramId),
    /// `set_uniforms`
    SetUniforms {
        /// Target program.
        program: ProgramId,
        /// Uniform block bytes.
        block: Vec<u8>,
    },
    /// `release_program`
    ReleaseProgram(ProgramId),
    /// `create_buffer`
    CreateBuffer {
        /// New handle.
        buffer: BufferId,
        /// Size in bytes.
        size: u64,
        /// Usage.
        usage: BufferUsage,
    },
    /// `write_buffer`
    WriteBuffer {
        /// Target buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
        /// Written bytes.
        data: Vec<u8>,
    },
    /// `release_buffer`
    ReleaseBuffer(BufferId),
    /// `create_texture`
    CreateTexture {
        /// New handle.
        texture: TextureId,
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
    /// `bind_texture`
    BindTexture(TextureId),
    /// `release_texture`
    ReleaseTexture(TextureId),
    /// `bind_storage_buffer`
    BindStorageBuffer {
        /// Storage slot.
        slot: u32,
        /// Bound buffer.
        buffer: BufferId,
    },
    /// `dispatch_compute`
    DispatchCompute {
        /// Current program at dispatch time.
        program: ProgramId,
        /// Work group counts.
        groups: [u32; 3],
        /// Uniform block consumed by the dispatch.
        uniforms: Vec<u8>,
    },
    /// `memory_barrier`
    MemoryBarrier(MemoryBarrier),
    /// `create_vertex_array`
    CreateVertexArray {
        /// New handle.
        vertex_array: VertexArrayId,
        /// Source buffer.
        buffer: BufferId,
        /// Attribute layout.
        layout: VertexLayout,
    },
    /// `bind_vertex_array`
    BindVertexArray(VertexArrayId),
    /// `release_vertex_array`
    ReleaseVertexArray(VertexArrayId),
    /// `begin_frame`
    BeginFrame,
    /// `draw`
    Draw {
        /// Current program at draw time.
        program: ProgramId,
        /// Current vertex array at draw time.
        vertex_array: VertexArrayId,
        /// Bound texture, for textured programs.
        texture: Option<TextureId>,
        /// Primitive assembly.
        primitive: Primitive,
        /// First record.
        first: u32,
        /// Record count.
        count: u32,
        /// Uniform block consumed by the draw.
        uniforms: Vec<u8>,
    },
    /// `end_frame`
    EndFrame,
}

/// Failure the device reports instead of performing a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Compile error when the program with this label is created.
    ShaderCompile {
        /// Program label.
        program: &'static str,
        /// Failing stage.
        stage: ShaderStage,
    },
    /// Link error when the program with this label is created.
    ProgramLink {
        /// Program label.
        program: &'static str,
    },
    /// `GpuCall` error on the next call of this trait method.
    Call {
        /// Trait method name, e.g. `"draw"`.
        operation: &'static str,
    },
}

#[derive(Debug)]
struct ProgramRecord {
    label: &'static str,
    uniforms: Vec<u8>,
    render: Option<(Primitive, bool)>,
}

#[derive(Debug)]
struct BufferRecord {
    data: Vec<u8>,
    awaiting_barrier: bool,
}

#[derive(Debug)]
struct VertexArrayRecord {
    buffer: BufferId,
    layout: VertexLayout,
}

/// GPU device that records instead of rendering.
#[derive(Debug)]
pub struct RecordingDevice {
    capabilities: GpuCapabilities,
    commands: Vec<GpuCommand>,
    failures: Vec<InjectedFailure>,
    next_raw: u32,
    programs: HashMap<ProgramId, ProgramRecord>,
    buffers: HashMap<BufferId, BufferRecord>,
    textures: HashMap<TextureId, (u32, u32)>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayRecord>,
    storage: HashMap<u32, BufferId>,
    current_program: Option<ProgramId>,
    current_vertex_array: Option<VertexArrayId>,
    current_texture: Option<TextureId>,
    global_state: Option<GlobalState>,
    viewport: (u32, u32),
    in_frame: bool,
    frames_completed: u64,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    /// Recording device reporting compute support at API 3.1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(GpuCapabilities {
            backend: "recording".to_string(),
            api_version: Some(ApiVersion::MIN_COMPUTE),
            compute_shaders: true,
        })
    }

    /// Recording device reporting the given capabilities.
    #[must_use]
    pub fn with_capabilities(capabilities: GpuCapabilities) -> Self {
        Self {
            capabilities,
            commands: Vec::new(),
            failures: Vec::new(),
            next_raw: 1,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            vertex_arrays: HashMap::new(),
            storage: HashMap::new(),
            current_program: None,
            current_vertex_array: None,
            current_texture: None,
            global_state: None,
            viewport: (0, 0),
            in_frame: false,
            frames_completed: 0,
        }
    }

    /// Queues a failure; each one fires once.
    pub fn inject_failure(&mut self, failure: InjectedFailure) {
        self.failures.push(failure);
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drains the command log.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Live program count.
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Live buffer count.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Live texture count.
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Live vertex array count.
    #[must_use]
    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    /// Looks up a live program by label.
    #[must_use]
    pub fn program_by_label(&self, label: &str) -> Option<ProgramId> {
        self.programs
            .iter()
            .find(|(_, record)| record.label == label)
            .map(|(id, _)| *id)
    }

    /// Current uniform block of a live program.
    #[must_use]
    pub fn uniforms(&self, program: ProgramId) -> Option<&[u8]> {
        self.programs.get(&program).map(|p| p.uniforms.as_slice())
    }

    /// Contents of a live buffer as written from the CPU.
    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    /// State set by the last `set_global_state`.
    #[must_use]
    pub fn global_state(&self) -> Option<GlobalState> {
        self.global_state
    }

    /// Viewport set by the last `set_viewport`.
    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Frames closed with `end_frame`.
    #[must_use]
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    fn check(&mut self, operation: &'static str) -> DissolveResult<()> {
        let injected = self
            .failures
            .iter()
            .position(|f| *f == InjectedFailure::Call { operation });
        match injected {
            Some(index) => {
                self.failures.remove(index);
                Err(DissolveError::gpu_call(operation, "injected failure"))
            }
            None => Ok(()),
        }
    }

    fn check_program_failures(&mut self, label: &'static str) -> DissolveResult<()> {
        let index = self.failures.iter().position(|f| match f {
            InjectedFailure::ShaderCompile { program, .. }
            | InjectedFailure::ProgramLink { program } => *program == label,
            InjectedFailure::Call { .. } => false,
        });
        let Some(index) = index else {
            return Ok(());
        };
        match self.failures.remove(index) {
            InjectedFailure::ShaderCompile { stage, .. } => Err(DissolveError::ShaderCompile {
                stage,
                log: format!("injected compile failure in {label}"),
            }),
            InjectedFailure::ProgramLink { .. } => Err(DissolveError::ProgramLink {
                program: label,
                log: "injected link failure".to_string(),
            }),
            InjectedFailure::Call { operation } => {
                Err(DissolveError::gpu_call(operation, "injected failure"))
            }
        }
    }

    fn allocate_raw(&mut self) -> u32 {
        let raw = self.next_raw;
        self.next_raw += 1;
        raw
    }

    fn program(&self, operation: &'static str, id: ProgramId) -> DissolveResult<&ProgramRecord> {
        self.programs
            .get(&id)
            .ok_or_else(|| DissolveError::gpu_call(operation, format!("unknown program {id:?}")))
    }
}

fn check_source(stage: ShaderStage, source: &str) -> DissolveResult<()> {
    if source.trim().is_empty() {
        return Err(DissolveError::ShaderCompile {
            stage,
            log: "empty shader source".to_string(),
        });
    }
    Ok(())
}

impl GpuDevice for RecordingDevice {
    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities.clone()
    }

    fn set_global_state(&mut self, state: GlobalState) -> DissolveResult<()> {
        self.check("set_global_state")?;
        self.global_state = Some(state);
        self.commands.push(GpuCommand::SetGlobalState(state));
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> DissolveResult<()> {
        self.check("set_viewport")?;
        self.viewport = (width, height);
        self.commands.push(GpuCommand::SetViewport { width, height });
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> DissolveResult<ProgramId> {
        self.check("create_program")?;
        self.check_program_failures(desc.label)?;
        let render = match desc.kind {
            ProgramKind::Compute { source } => {
                check_source(ShaderStage::Compute, source)?;
                None
            }
            ProgramKind::Render {
                vertex,
                fragment,
                primitive,
                textured,
                ..
            } => {
                check_source(ShaderStage::Vertex, vertex)?;
                check_source(ShaderStage::Fragment, fragment)?;
                Some((primitive, textured))
            }
        };
        let program = ProgramId::from_raw(self.allocate_raw());
        self.programs.insert(
            program,
            ProgramRecord {
                label: desc.label,
                uniforms: vec![0; usize::try_from(desc.uniform_size).unwrap_or(0)],
                render,
            },
        );
        self.commands.push(GpuCommand::CreateProgram {
            program,
            label: desc.label,
        });
        Ok(program)
    }

    fn use_program(&mut self, program: ProgramId) -> DissolveResult<()> {
        self.check("use_program")?;
        self.program("use_program", program)?;
        self.current_program = Some(program);
        self.commands.push(GpuCommand::UseProgram(program));
        Ok(())
    }

    fn set_uniforms(&mut self, program: ProgramId, block: &[u8]) -> DissolveResult<()> {
        self.check("set_uniforms")?;
        let record = self.programs.get_mut(&program).ok_or_else(|| {
            DissolveError::gpu_call("set_uniforms", format!("unknown program {program:?}"))
        })?;
        if block.len() != record.uniforms.len() {
            return Err(DissolveError::gpu_call(
                "set_uniforms",
                format!(
                    "{} expects a {}-byte block, got {}",
                    record.label,
                    record.uniforms.len(),
                    block.len()
                ),
            ));
        }
        record.uniforms.copy_from_slice(block);
        self.commands.push(GpuCommand::SetUniforms {
            program,
            block: block.to_vec(),
        });
        Ok(())
    }

    fn release_program(&mut self, program: ProgramId) -> DissolveResult<()> {
        self.check("release_program")?;
        self.programs.remove(&program).ok_or_else(|| {
            DissolveError::gpu_call("release_program", format!("unknown program {program:?}"))
        })?;
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.commands.push(GpuCommand::ReleaseProgram(program));
        Ok(())
    }

    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> DissolveResult<BufferId> {
        self.check("create_buffer")?;
        let len = usize::try_from(size)
            .ok()
            .filter(|len| *len > 0)
            .ok_or_else(|| DissolveError::gpu_call("create_buffer", format!("bad size {size}")))?;
        let buffer = BufferId::from_raw(self.allocate_raw());
        self.buffers.insert(
            buffer,
            BufferRecord {
                data: vec![0; len],
                awaiting_barrier: false,
            },
        );
        self.commands.push(GpuCommand::CreateBuffer {
            buffer,
            size,
            usage,
        });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> DissolveResult<()> {
        self.check("write_buffer")?;
        let record = self.buffers.get_mut(&buffer).ok_or_else(|| {
            DissolveError::gpu_call("write_buffer", format!("unknown buffer {buffer:?}"))
        })?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(data.len());
        if end > record.data.len() {
            return Err(DissolveError::gpu_call(
                "write_buffer",
                format!(
                    "write of {} bytes at {offset} overflows {}-byte buffer",
                    data.len(),
                    record.data.len()
                ),
            ));
        }
        record.data[start..end].copy_from_slice(data);
        self.commands.push(GpuCommand::WriteBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) -> DissolveResult<()> {
        self.check("release_buffer")?;
        self.buffers.remove(&buffer).ok_or_else(|| {
            DissolveError::gpu_call("release_buffer", format!("unknown buffer {buffer:?}"))
        })?;
        self.storage.retain(|_, bound| *bound != buffer);
        self.commands.push(GpuCommand::ReleaseBuffer(buffer));
        Ok(())
    }

    fn create_texture(&mut self, bitmap: &Bitmap) -> DissolveResult<TextureId> {
        self.check("create_texture")?;
        if bitmap.is_empty() {
            return Err(DissolveError::gpu_call(
                "create_texture",
                "zero-sized texture",
            ));
        }
        let texture = TextureId::from_raw(self.allocate_raw());
        self.textures
            .insert(texture, (bitmap.width(), bitmap.height()));
        self.commands.push(GpuCommand::CreateTexture {
            texture,
            width: bitmap.width(),
            height: bitmap.height(),
        });
        Ok(texture)
    }

    fn bind_texture(&mut self, texture: TextureId) -> DissolveResult<()> {
        self.check("bind_texture")?;
        if !self.textures.contains_key(&texture) {
            return Err(DissolveError::gpu_call(
                "bind_texture",
                format!("unknown texture {texture:?}"),
            ));
        }
        self.current_texture = Some(texture);
        self.commands.push(GpuCommand::BindTexture(texture));
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureId) -> DissolveResult<()> {
        self.check("release_texture")?;
        self.textures.remove(&texture).ok_or_else(|| {
            DissolveError::gpu_call("release_texture", format!("unknown texture {texture:?}"))
        })?;
        if self.current_texture == Some(texture) {
            self.current_texture = None;
        }
        self.commands.push(GpuCommand::ReleaseTexture(texture));
        Ok(())
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferId) -> DissolveResult<()> {
        self.check("bind_storage_buffer")?;
        if !self.buffers.contains_key(&buffer) {
            return Err(DissolveError::gpu_call(
                "bind_storage_buffer",
                format!("unknown buffer {buffer:?}"),
            ));
        }
        self.storage.insert(slot, buffer);
        self.commands
            .push(GpuCommand::BindStorageBuffer { slot, buffer });
        Ok(())
    }

    fn dispatch_compute(&mut self, groups: [u32; 3]) -> DissolveResult<()> {
        self.check("dispatch_compute")?;
        let program = self
            .current_program
            .ok_or_else(|| DissolveError::gpu_call("dispatch_compute", "no program in use"))?;
        let record = self.program("dispatch_compute", program)?;
        if record.render.is_some() {
            return Err(DissolveError::gpu_call(
                "dispatch_compute",
                format!("{} is not a compute program", record.label),
            ));
        }
        let uniforms = record.uniforms.clone();
        if self.current_texture.is_none() {
            return Err(DissolveError::gpu_call("dispatch_compute", "no texture bound"));
        }
        let target = *self
            .storage
            .get(&0)
            .ok_or_else(|| DissolveError::gpu_call("dispatch_compute", "no storage at slot 0"))?;
        if let Some(buffer) = self.buffers.get_mut(&target) {
            buffer.awaiting_barrier = true;
        }
        self.commands.push(GpuCommand::DispatchCompute {
            program,
            groups,
            uniforms,
        });
        Ok(())
    }

    fn memory_barrier(&mut self, barrier: MemoryBarrier) -> DissolveResult<()> {
        self.check("memory_barrier")?;
        match barrier {
            MemoryBarrier::VertexAttribArray => {
                for buffer in self.buffers.values_mut() {
                    buffer.awaiting_barrier = false;
                }
            }
        }
        self.commands.push(GpuCommand::MemoryBarrier(barrier));
        Ok(())
    }

    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> DissolveResult<VertexArrayId> {
        self.check("create_vertex_array")?;
        if !self.buffers.contains_key(&buffer) {
            return Err(DissolveError::gpu_call(
                "create_vertex_array",
                format!("unknown buffer {buffer:?}"),
            ));
        }
        let vertex_array = VertexArrayId::from_raw(self.allocate_raw());
        self.vertex_arrays
            .insert(vertex_array, VertexArrayRecord { buffer, layout });
        self.commands.push(GpuCommand::CreateVertexArray {
            vertex_array,
            buffer,
            layout,
        });
        Ok(vertex_array)
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> DissolveResult<()> {
        self.check("bind_vertex_array")?;
        if !self.vertex_arrays.contains_key(&vertex_array) {
            return Err(DissolveError::gpu_call(
                "bind_vertex_array",
                format!("unknown vertex array {vertex_array:?}"),
            ));
        }
        self.current_vertex_array = Some(vertex_array);
        self.commands.push(GpuCommand::BindVertexArray(vertex_array));
        Ok(())
    }

    fn release_vertex_array(&mut self, vertex_array: VertexArrayId) -> DissolveResult<()> {
        self.check("release_vertex_array")?;
        self.vertex_arrays.remove(&vertex_array).ok_or_else(|| {
            DissolveError::gpu_call(
                "release_vertex_array",
                format!("unknown vertex array {vertex_array:?}"),
            )
        })?;
        if self.current_vertex_array == Some(vertex_array) {
            self.current_vertex_array = None;
        }
        self.commands
            .push(GpuCommand::ReleaseVertexArray(vertex_array));
        Ok(())
    }

    fn begin_frame(&mut self) -> DissolveResult<()> {
        self.check("begin_frame")?;
        if self.in_frame {
            return Err(DissolveError::gpu_call("begin_frame", "frame already open"));
        }
        self.in_frame = true;
        self.commands.push(GpuCommand::BeginFrame);
        Ok(())
    }

    fn draw(&mut self, primitive: Primitive, first: u32, count: u32) -> DissolveResult<()> {
        self.check("draw")?;
        if !self.in_frame {
            return Err(DissolveError::gpu_call("draw", "no frame in progress"));
        }
        let program = self
            .current_program
            .ok_or_else(|| DissolveError::gpu_call("draw", "no program in use"))?;
        let record = self.program("draw", program)?;
        let Some((expected, textured)) = record.render else {
            return Err(DissolveError::gpu_call(
                "draw",
                format!("{} is a compute program", record.label),
            ));
        };
        if expected != primitive {
            return Err(DissolveError::gpu_call(
                "draw",
                format!("{} draws {expected:?}, not {primitive:?}", record.label),
            ));
        }
        let uniforms = record.uniforms.clone();
        let vertex_array = self
            .current_vertex_array
            .ok_or_else(|| DissolveError::gpu_call("draw", "no vertex array bound"))?;
        let array = self
            .vertex_arrays
            .get(&vertex_array)
            .ok_or_else(|| DissolveError::gpu_call("draw", "stale vertex array"))?;
        let buffer = self.buffers.get(&array.buffer).ok_or_else(|| {
            DissolveError::gpu_call("draw", "vertex array buffer was released")
        })?;
        if buffer.awaiting_barrier {
            return Err(DissolveError::gpu_call(
                "draw",
                "buffer read before compute memory barrier",
            ));
        }
        let records = array.layout.records_in(buffer.data.len() as u64);
        if u64::from(first) + u64::from(count) > records {
            return Err(DissolveError::gpu_call(
                "draw",
                format!("{first}+{count} records exceeds buffer of {records}"),
            ));
        }
        let texture = if textured {
            Some(
                self.current_texture
                    .ok_or_else(|| DissolveError::gpu_call("draw", "no texture bound"))?,
            )
        } else {
            None
        };
        self.commands.push(GpuCommand::Draw {
            program,
            vertex_array,
            texture,
            primitive,
            first,
            count,
            uniforms,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> DissolveResult<()> {
        self.check("end_frame")?;
        if !self.in_frame {
            return Err(DissolveError::gpu_call("end_frame", "no frame in progress"));
        }
        self.in_frame = false;
        self.frames_completed += 1;
        self.commands.push(GpuCommand::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::VertexAttribute;

    const LAYOUT: VertexLayout = VertexLayout {
        stride: 16,
        attributes: &[VertexAttribute {
            location: 0,
            components: 4,
            offset: 0,
        }],
    };

    fn render_program(device: &mut RecordingDevice) -> ProgramId {
        device
            .create_program(&ProgramDesc {
                label: "points",
                uniform_size: 16,
                kind: ProgramKind::Render {
                    vertex: "vs",
                    fragment: "fs",
                    layout: LAYOUT,
                    primitive: Primitive::PointSprites,
                    textured: false,
                },
            })
            .unwrap()
    }

    #[test]
    fn test_double_release_is_rejected() {
        let mut device = RecordingDevice::new();
        let buffer = device.create_buffer(64, BufferUsage::Vertices).unwrap();
        device.release_buffer(buffer).unwrap();
        let err = device.release_buffer(buffer).unwrap_err();
        assert!(matches!(
            err,
            DissolveError::GpuCall {
                operation: "release_buffer",
                ..
            }
        ));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_draw_requires_open_frame() {
        let mut device = RecordingDevice::new();
        let program = render_program(&mut device);
        let buffer = device.create_buffer(64, BufferUsage::Vertices).unwrap();
        let vao = device.create_vertex_array(buffer, LAYOUT).unwrap();
        device.use_program(program).unwrap();
        device.bind_vertex_array(vao).unwrap();

        assert!(device.draw(Primitive::PointSprites, 0, 4).is_err());
        device.begin_frame().unwrap();
        device.draw(Primitive::PointSprites, 0, 4).unwrap();
        assert!(device.draw(Primitive::PointSprites, 0, 5).is_err());
        device.end_frame().unwrap();
        assert_eq!(device.frames_completed(), 1);
    }

    #[test]
    fn test_write_bounds_checked() {
        let mut device = RecordingDevice::new();
        let buffer = device.create_buffer(8, BufferUsage::Vertices).unwrap();
        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.buffer_contents(buffer).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(device.write_buffer(buffer, 6, &[0; 4]).is_err());
    }

    #[test]
    fn test_injected_call_failure_fires_once() {
        let mut device = RecordingDevice::new();
        device.inject_failure(InjectedFailure::Call {
            operation: "begin_frame",
        });
        assert!(device.begin_frame().is_err());
        device.begin_frame().unwrap();
    }

    #[test]
    fn test_injected_compile_failure_targets_label() {
        let mut device = RecordingDevice::new();
        device.inject_failure(InjectedFailure::ShaderCompile {
            program: "points",
            stage: ShaderStage::Vertex,
        });
        let err = device
            .create_program(&ProgramDesc {
                label: "points",
                uniform_size: 16,
                kind: ProgramKind::Compute { source: "cs" },
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DissolveError::ShaderCompile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_uniform_block_size_enforced() {
        let mut device = RecordingDevice::new();
        let program = render_program(&mut device);
        assert!(device.set_uniforms(program, &[0; 8]).is_err());
        device.set_uniforms(program, &[7; 16]).unwrap();
        assert_eq!(device.uniforms(program).unwrap(), &[7; 16]);
    }
}
