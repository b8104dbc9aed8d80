//! Dust program (render).
//!
//! Draws the revealed columns as point sprites straight from the particle
//! buffer. The output is a pure function of the buffer and the uniform block,
//! so the same buffer can be drawn every frame with a growing `time`.

use bytemuck::{Pod, Zeroable};

use crate::effect::PARTICLE_LAYOUT;
use crate::error::DissolveResult;
use crate::gpu::{GpuDevice, Primitive, ProgramDesc, ProgramKind, VertexArrayId};

use super::{ProgramHandle, ShaderProgram, UniformBlock};

/// Dust uniform block (96 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DustUniforms {
    /// Column-major projection.
    pub mvp: [f32; 16],
    /// Grid columns.
    pub width: i32,
    /// Grid rows.
    pub height: i32,
    /// Seconds since the effect spawned.
    pub time: f32,
    /// Particle size in pixels.
    pub size: f32,
    /// Seconds the reveal boundary takes to cross the grid.
    pub reveal: f32,
    /// Seconds a particle flies after its column is revealed.
    pub flight: f32,
    /// Padding to a 16-byte multiple.
    pub padding: [f32; 2],
}

/// Point-sprite program for revealed particles.
#[derive(Debug)]
pub struct DustProgram {
    handle: ProgramHandle,
    uniforms: UniformBlock<DustUniforms>,
}

impl DustProgram {
    /// Program label.
    pub const LABEL: &'static str = "dust";

    /// Compiles and links the vertex and fragment stages.
    ///
    /// # Errors
    ///
    /// `ShaderCompile` / `ProgramLink` from the device.
    pub fn compile<D: GpuDevice + ?Sized>(
        device: &mut D,
        vertex: &str,
        fragment: &str,
    ) -> DissolveResult<Self> {
        let id = device.create_program(&ProgramDesc {
            label: Self::LABEL,
            uniform_size: std::mem::size_of::<DustUniforms>() as u64,
            kind: ProgramKind::Render {
                vertex,
                fragment,
                layout: PARTICLE_LAYOUT,
                primitive: Primitive::PointSprites,
                textured: false,
            },
        })?;
        Ok(Self {
            handle: ProgramHandle::new(id, Self::LABEL),
            uniforms: UniformBlock::new(DustUniforms::default()),
        })
    }

    /// Current uniform values.
    #[must_use]
    pub fn uniforms(&self) -> &DustUniforms {
        self.uniforms.get()
    }

    /// Sets the projection.
    pub fn set_mvp(&mut self, mvp: &[f32; 16]) {
        self.uniforms.update(|u| u.mvp = *mvp);
    }

    /// Sets the grid dimensions the shader derives columns from.
    pub fn set_grid(&mut self, columns: u32, rows: u32) {
        let width = i32::try_from(columns).unwrap_or(i32::MAX);
        let height = i32::try_from(rows).unwrap_or(i32::MAX);
        self.uniforms.update(|u| {
            u.width = width;
            u.height = height;
        });
    }

    /// Sets the effect time in seconds.
    pub fn set_time(&mut self, time: f32) {
        self.uniforms.update(|u| u.time = time);
    }

    /// Sets the particle size in pixels.
    pub fn set_size(&mut self, size: f32) {
        self.uniforms.update(|u| u.size = size);
    }

    /// Sets the reveal duration and the per-particle flight time.
    pub fn set_timing(&mut self, reveal_secs: f32, flight_secs: f32) {
        self.uniforms.update(|u| {
            u.reveal = reveal_secs;
            u.flight = flight_secs;
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

    /// Draws the first `count` particles of `particles`. Zero is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    pub fn draw<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        particles: VertexArrayId,
        count: u32,
    ) -> DissolveResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.flush(device)?;
        device.bind_vertex_array(particles)?;
        device.draw(Primitive::PointSprites, 0, count)
    }
}

impl ShaderProgram for DustProgram {
    fn handle(&self) -> ProgramHandle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_size() {
        assert_eq!(std::mem::size_of::<DustUniforms>(), 96);
    }

    #[test]
    fn test_grid_dimensions_saturate() {
        let mut device = crate::gpu::RecordingDevice::new();
        let mut dust = DustProgram::compile(&mut device, "vs", "fs").unwrap();
        dust.set_grid(u32::MAX, 3);
        assert_eq!(dust.uniforms().width, i32::MAX);
        assert_eq!(dust.uniforms().height, 3);
    }
}
