//! # GPU Device Abstraction
//!
//! The engine speaks a small, GL-shaped command vocabulary:
//!
//! ```text
//! DustRenderer
//!   │  init:  create_program x3
//!   │  start: create_texture → create_buffer → dispatch_compute → memory_barrier
//!   │  frame: begin_frame → (use_program → set_uniforms → draw)* → end_frame
//!   ▼
//! GpuDevice ──┬── WgpuDevice       (wgpu pipelines, real GPU)
//!             └── RecordingDevice  (headless command log)
//! ```
//!
//! Handles are opaque and typed. Uniform blocks are bound to programs and
//! persist between calls; a draw or dispatch consumes the block as it is at
//! the moment of the call, never a later value.

pub mod blend;
pub mod recording;
pub mod wgpu_backend;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capture::Bitmap;
use crate::error::DissolveResult;

pub use blend::{BlendFactor, BlendMode, BlendOp, BlendStateConfig};
pub use recording::{GpuCommand, InjectedFailure, RecordingDevice};
pub use wgpu_backend::WgpuDevice;

macro_rules! gpu_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a backend-assigned raw id.
            #[must_use]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

gpu_handle!(
    /// Compiled shader program.
    ProgramId
);
gpu_handle!(
    /// GPU buffer.
    BufferId
);
gpu_handle!(
    /// Sampled 2D texture.
    TextureId
);
gpu_handle!(
    /// Buffer plus the attribute layout used to read it.
    VertexArrayId
);

/// Graphics API version reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl ApiVersion {
    /// Oldest API level with compute shaders and memory barriers (GLES 3.1).
    pub const MIN_COMPUTE: Self = Self::new(3, 1);

    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What a device can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuCapabilities {
    /// Backend name, for logs.
    pub backend: String,
    /// API version, when the backend reports one.
    pub api_version: Option<ApiVersion>,
    /// Compute dispatch support.
    pub compute_shaders: bool,
}

/// State applied once at init and kept for every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalState {
    /// RGBA clear color for `begin_frame`.
    pub clear_color: [f32; 4],
    /// Blend equation for every render program.
    pub blend: BlendMode,
}

/// One vertex attribute inside an interleaved record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader location.
    pub location: u32,
    /// Number of `f32` components (1..=4).
    pub components: u32,
    /// Byte offset inside the record.
    pub offset: u64,
}

/// Interleaved `f32` vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Record size in bytes.
    pub stride: u64,
    /// Attributes read from each record.
    pub attributes: &'static [VertexAttribute],
}

impl VertexLayout {
    /// Number of whole records a buffer of `size` bytes holds.
    #[must_use]
    pub const fn records_in(&self, size: u64) -> u64 {
        if self.stride == 0 {
            0
        } else {
            size / self.stride
        }
    }
}

/// Primitive assembly for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// One screen-aligned square per record, sized by the program.
    PointSprites,
    /// Triangle strip over consecutive records.
    TriangleStrip,
}

/// How a buffer will be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written by compute, read as vertices.
    Particles,
    /// Written from the CPU, read as vertices.
    Vertices,
}

/// Barrier kinds issued after compute writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryBarrier {
    /// Compute writes become visible to vertex attribute fetch.
    VertexAttribArray,
}

/// Shader stages of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind<'a> {
    /// Single compute stage, entry point `main`, workgroup size fixed by the source.
    Compute {
        /// WGSL source.
        source: &'a str,
    },
    /// Vertex plus fragment stage, both with entry point `main`.
    Render {
        /// WGSL vertex source.
        vertex: &'a str,
        /// WGSL fragment source.
        fragment: &'a str,
        /// Vertex buffer layout.
        layout: VertexLayout,
        /// Primitive assembly.
        primitive: Primitive,
        /// Samples the bound texture in the fragment stage.
        textured: bool,
    },
}

/// Everything needed to build a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramDesc<'a> {
    /// Label for logs and errors.
    pub label: &'static str,
    /// Size of the uniform block in bytes.
    pub uniform_size: u64,
    /// Stages.
    pub kind: ProgramKind<'a>,
}

/// GPU operations the engine issues.
///
/// Every call may fail; failures are fatal for the caller. A device is
/// driven from a single thread.
pub trait GpuDevice {
    /// Reports what the device supports.
    fn capabilities(&self) -> GpuCapabilities;

    /// Sets the clear color and blend equation.
    fn set_global_state(&mut self, state: GlobalState) -> DissolveResult<()>;

    /// Sets the viewport in pixels.
    fn set_viewport(&mut self, width: u32, height: u32) -> DissolveResult<()>;

    /// Compiles and links a program.
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> DissolveResult<ProgramId>;

    /// Makes `program` current for dispatches and draws.
    fn use_program(&mut self, program: ProgramId) -> DissolveResult<()>;

    /// Replaces the uniform block of `program`.
    fn set_uniforms(&mut self, program: ProgramId, block: &[u8]) -> DissolveResult<()>;

    /// Releases a program.
    fn release_program(&mut self, program: ProgramId) -> DissolveResult<()>;

    /// Allocates a zeroed buffer of `size` bytes.
    fn create_buffer(&mut self, size: u64, usage: BufferUsage) -> DissolveResult<BufferId>;

    /// Copies `data` into `buffer` at `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> DissolveResult<()>;

    /// Releases a buffer.
    fn release_buffer(&mut self, buffer: BufferId) -> DissolveResult<()>;

    /// Uploads a bitmap as a sampled texture.
    fn create_texture(&mut self, bitmap: &Bitmap) -> DissolveResult<TextureId>;

    /// Binds `texture` to the single texture slot.
    fn bind_texture(&mut self, texture: TextureId) -> DissolveResult<()>;

    /// Releases a texture.
    fn release_texture(&mut self, texture: TextureId) -> DissolveResult<()>;

    /// Binds `buffer` as compute storage at `slot`.
    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferId) -> DissolveResult<()>;

    /// Runs the current compute program over `groups` work groups.
    fn dispatch_compute(&mut self, groups: [u32; 3]) -> DissolveResult<()>;

    /// Orders earlier compute writes before later reads.
    fn memory_barrier(&mut self, barrier: MemoryBarrier) -> DissolveResult<()>;

    /// Describes how to read `buffer` as vertices.
    fn create_vertex_array(
        &mut self,
        buffer: BufferId,
        layout: VertexLayout,
    ) -> DissolveResult<VertexArrayId>;

    /// Makes `vertex_array` current for draws.
    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> DissolveResult<()>;

    /// Releases a vertex array. The underlying buffer is untouched.
    fn release_vertex_array(&mut self, vertex_array: VertexArrayId) -> DissolveResult<()>;

    /// Starts a frame; the target is cleared to the global clear color.
    fn begin_frame(&mut self) -> DissolveResult<()>;

    /// Draws `count` records starting at `first` with the current program,
    /// vertex array and texture.
    fn draw(&mut self, primitive: Primitive, first: u32, count: u32) -> DissolveResult<()>;

    /// Finishes and submits the frame.
    fn end_frame(&mut self) -> DissolveResult<()>;
}
