//! GPU particle record.

use bytemuck::{Pod, Zeroable};

use crate::gpu::{VertexAttribute, VertexLayout};

/// One particle as written by the spawn shader (48 bytes).
///
/// The engine never reads these on the CPU; the layout only has to agree
/// with the shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// RGBA sampled from the capture (slot 0).
    pub color: [f32; 4],
    /// Spawn position in pixels (slot 1).
    pub origin: [f32; 2],
    /// Pixels per second (slot 2).
    pub velocity: [f32; 2],
    /// Per-particle random phase (slot 3).
    pub phase: f32,
    /// Pads the record to 48 bytes.
    pub padding: [f32; 3],
}

impl Particle {
    /// Record size in bytes.
    pub const STRIDE: u64 = 48;
}

/// Attribute slots 4/2/2/1 floats at offsets 0/16/24/32.
pub const PARTICLE_LAYOUT: VertexLayout = VertexLayout {
    stride: Particle::STRIDE,
    attributes: &[
        VertexAttribute {
            location: 0,
            components: 4,
            offset: 0,
        },
        VertexAttribute {
            location: 1,
            components: 2,
            offset: 16,
        },
        VertexAttribute {
            location: 2,
            components: 2,
            offset: 24,
        },
        VertexAttribute {
            location: 3,
            components: 1,
            offset: 32,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_size() {
        assert_eq!(std::mem::size_of::<Particle>() as u64, Particle::STRIDE);
    }

    #[test]
    fn test_layout_matches_record() {
        let offsets = [
            bytemuck::offset_of!(Particle, color),
            bytemuck::offset_of!(Particle, origin),
            bytemuck::offset_of!(Particle, velocity),
            bytemuck::offset_of!(Particle, phase),
        ];
        for (attribute, offset) in PARTICLE_LAYOUT.attributes.iter().zip(offsets) {
            assert_eq!(attribute.offset, offset as u64);
        }
        let components: Vec<u32> = PARTICLE_LAYOUT
            .attributes
            .iter()
            .map(|a| a.components)
            .collect();
        assert_eq!(components, vec![4, 2, 2, 1]);
    }
}
