//! Sprite program (render).
//!
//! Draws the still-unrevealed part of the capture as a 4-vertex strip:
//! ```text
//!  v2 ────────── v0      v0/v1: right edge, written once
//!   │ ╲          │      v2/v3: reveal boundary, rewritten per frame
//!   │    ╲       │
//!  v3 ────────── v1
//! ```

use bytemuck::{Pod, Zeroable};

use crate::error::DissolveResult;
use crate::gpu::{
    GpuDevice, Primitive, ProgramDesc, ProgramKind, TextureId, VertexArrayId, VertexAttribute,
    VertexLayout,
};

use super::{ProgramHandle, ShaderProgram, UniformBlock};

/// One corner of the sprite quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    /// Screen position in pixels.
    pub position: [f32; 2],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

impl SpriteVertex {
    /// Creates a vertex.
    #[must_use]
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y],
            uv: [u, v],
        }
    }
}

/// Vertex layout of [`SpriteVertex`].
pub const SPRITE_LAYOUT: VertexLayout = VertexLayout {
    stride: 16,
    attributes: &[
        VertexAttribute {
            location: 0,
            components: 2,
            offset: 0,
        },
        VertexAttribute {
            location: 1,
            components: 2,
            offset: 8,
        },
    ],
};

/// Sprite uniform block (64 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteUniforms {
    /// Column-major projection.
    pub mvp: [f32; 16],
}

/// Textured-quad program for the unrevealed capture.
#[derive(Debug)]
pub struct SpriteProgram {
    handle: ProgramHandle,
    uniforms: UniformBlock<SpriteUniforms>,
}

impl SpriteProgram {
    /// Program label.
    pub const LABEL: &'static str = "sprite";

    /// Vertices in the quad strip.
    pub const VERTEX_COUNT: u32 = 4;

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
            uniform_size: std::mem::size_of::<SpriteUniforms>() as u64,
            kind: ProgramKind::Render {
                vertex,
                fragment,
                layout: SPRITE_LAYOUT,
                primitive: Primitive::TriangleStrip,
                textured: true,
            },
        })?;
        Ok(Self {
            handle: ProgramHandle::new(id, Self::LABEL),
            uniforms: UniformBlock::new(SpriteUniforms::default()),
        })
    }

    /// Current uniform values.
    #[must_use]
    pub fn uniforms(&self) -> &SpriteUniforms {
        self.uniforms.get()
    }

    /// Sets the projection.
    pub fn set_mvp(&mut self, mvp: &[f32; 16]) {
        self.uniforms.update(|u| u.mvp = *mvp);
    }

    /// Uploads pending uniform changes.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> DissolveResult<()> {
        self.uniforms.flush(device, self.handle.id())
    }

    /// Draws the quad in `quad` sampling `texture`.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    pub fn draw<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        quad: VertexArrayId,
        texture: TextureId,
    ) -> DissolveResult<()> {
        self.flush(device)?;
        device.bind_vertex_array(quad)?;
        device.bind_texture(texture)?;
        device.draw(Primitive::TriangleStrip, 0, Self::VERTEX_COUNT)
    }
}

impl ShaderProgram for SpriteProgram {
    fn handle(&self) -> ProgramHandle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_matches_layout() {
        assert_eq!(std::mem::size_of::<SpriteVertex>() as u64, SPRITE_LAYOUT.stride);
        assert_eq!(bytemuck::offset_of!(SpriteVertex, uv) as u64, SPRITE_LAYOUT.attributes[1].offset);
    }
}
