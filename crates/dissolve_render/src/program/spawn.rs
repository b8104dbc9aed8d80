//! Spawn program (compute).
//!
//! One invocation per grid cell in 8x8 work groups. Runs exactly once per
//! effect; the memory barrier it ends with is the only point where the
//! render thread waits on compute.

use bytemuck::{Pod, Zeroable};

use crate::error::DissolveResult;
use crate::gpu::{BufferId, GpuDevice, MemoryBarrier, ProgramDesc, ProgramKind};

use super::{ProgramHandle, ShaderProgram, UniformBlock};

/// Spawn uniform block (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpawnUniforms {
    /// Left edge of the grid plus half a cell, so particles sit on cell centers.
    pub left: f32,
    /// Top edge of the grid plus half a cell.
    pub top: f32,
    /// Grid columns.
    pub width: u32,
    /// Grid rows.
    pub height: u32,
    /// Cell stride in pixels.
    pub stride: u32,
    /// Pads the block to 16-byte alignment.
    pub padding: [u32; 3],
}

/// Compute program that initializes a particle buffer.
#[derive(Debug)]
pub struct SpawnProgram {
    handle: ProgramHandle,
    uniforms: UniformBlock<SpawnUniforms>,
}

impl SpawnProgram {
    /// Program label.
    pub const LABEL: &'static str = "spawn";

    /// Work group edge length in both dimensions.
    pub const WORKGROUP_SIZE: u32 = 8;

    /// Compiles the compute stage.
    ///
    /// # Errors
    ///
    /// `ShaderCompile` / `ProgramLink` from the device.
    pub fn compile<D: GpuDevice + ?Sized>(device: &mut D, source: &str) -> DissolveResult<Self> {
        let id = device.create_program(&ProgramDesc {
            label: Self::LABEL,
            uniform_size: std::mem::size_of::<SpawnUniforms>() as u64,
            kind: ProgramKind::Compute { source },
        })?;
        Ok(Self {
            handle: ProgramHandle::new(id, Self::LABEL),
            uniforms: UniformBlock::new(SpawnUniforms::default()),
        })
    }

    /// Current uniform values.
    #[must_use]
    pub fn uniforms(&self) -> &SpawnUniforms {
        self.uniforms.get()
    }

    /// Sets the cell stride.
    pub fn set_stride(&mut self, stride: u32) {
        self.uniforms.update(|u| u.stride = stride);
    }

    /// Sets the position of the first particle center.
    pub fn set_origin(&mut self, left: f32, top: f32) {
        self.uniforms.update(|u| {
            u.left = left;
            u.top = top;
        });
    }

    /// Sets the grid dimensions.
    pub fn set_grid(&mut self, columns: u32, rows: u32) {
        self.uniforms.update(|u| {
            u.width = columns;
            u.height = rows;
        });
    }

    /// Uploads pending uniform changes.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> DissolveResult<()> {
        self.uniforms.flush(device, self.handle.id())
    }

    /// Fills `particles` and fences the writes against vertex fetch.
    ///
    /// The program must be active and the source texture bound.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    pub fn dispatch<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        particles: BufferId,
        groups: [u32; 3],
    ) -> DissolveResult<()> {
        self.flush(device)?;
        device.bind_storage_buffer(0, particles)?;
        device.dispatch_compute(groups)?;
        device.memory_barrier(MemoryBarrier::VertexAttribArray)
    }
}

impl ShaderProgram for SpawnProgram {
    fn handle(&self) -> ProgramHandle {
        self.handle
    }
}
