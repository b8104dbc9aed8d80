//! Dissolve Shaders
//!
//! WGSL source for the three programs:
//! 1. Spawn Shader - one invocation per grid cell, writes the particle record
//! 2. Dust Shaders - instanced quads, each particle flies off once its column is revealed
//! 3. Sprite Shaders - the not-yet-revealed part of the captured bitmap
//!
//! Every stage uses the entry point `main`. Hosts can swap any stage through
//! [`ShaderSources`]; replacements must keep the bindings and locations below.
//!
//! ```text
//! spawn   @group(0) @binding(0) storage   array<Particle>
//!         @group(0) @binding(1) uniform   SpawnUniforms   (32 bytes)
//!         @group(0) @binding(2) texture_2d<f32>
//! dust    @group(0) @binding(0) uniform   DustUniforms    (96 bytes)
//!         @location(0..=3) color, origin, velocity, phase  (per instance)
//! sprite  @group(0) @binding(0) uniform   SpriteUniforms  (64 bytes)
//!         @group(1) @binding(0) texture_2d<f32>, @binding(1) sampler
//!         @location(0..=1) position, uv                   (per vertex)
//! ```

use std::borrow::Cow;

/// WGSL text for every program stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    /// Spawn compute stage.
    pub spawn: Cow<'static, str>,
    /// Dust vertex stage.
    pub dust_vertex: Cow<'static, str>,
    /// Dust fragment stage.
    pub dust_fragment: Cow<'static, str>,
    /// Sprite vertex stage.
    pub sprite_vertex: Cow<'static, str>,
    /// Sprite fragment stage.
    pub sprite_fragment: Cow<'static, str>,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            spawn: Cow::Borrowed(SPAWN_WGSL),
            dust_vertex: Cow::Borrowed(DUST_VERTEX_WGSL),
            dust_fragment: Cow::Borrowed(DUST_FRAGMENT_WGSL),
            sprite_vertex: Cow::Borrowed(SPRITE_VERTEX_WGSL),
            sprite_fragment: Cow::Borrowed(SPRITE_FRAGMENT_WGSL),
        }
    }
}

// =============================================================================
// SPAWN SHADER - Grid cell to particle
// =============================================================================

const SPAWN_WGSL: &str = r#"
// Spawn Compute Shader
// Column-major: particle index = column * height + row

struct Particle {
    color: vec4<f32>,
    origin: vec2<f32>,
    velocity: vec2<f32>,
    phase: f32,
    pad0: f32,
    pad1: f32,
    pad2: f32,
}

struct SpawnUniforms {
    left: f32,
    top: f32,
    width: u32,
    height: u32,
    stride: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

@group(0) @binding(0) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(1) var<uniform> spawn: SpawnUniforms;
@group(0) @binding(2) var source: texture_2d<f32>;

// PCG random number generator
fn pcg(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn random_float(seed: u32) -> f32 {
    return f32(pcg(seed)) / 4294967295.0;
}

fn random_range(seed: u32, min_val: f32, max_val: f32) -> f32 {
    return min_val + random_float(seed) * (max_val - min_val);
}

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let column = global_id.x;
    let row = global_id.y;
    if (column >= spawn.width || row >= spawn.height) {
        return;
    }
    let index = column * spawn.height + row;
    let stride = f32(spawn.stride);

    // Sample the capture at the cell center
    let dims = vec2<i32>(textureDimensions(source));
    let cell_center = (vec2<f32>(f32(column), f32(row)) + vec2<f32>(0.5)) * stride;
    let texel = clamp(vec2<i32>(cell_center), vec2<i32>(0), dims - vec2<i32>(1));

    let seed = index * 4u + 1u;
    var p: Particle;
    p.color = textureLoad(source, texel, 0);
    p.origin = vec2<f32>(spawn.left + f32(column) * stride, spawn.top + f32(row) * stride);
    // Drift right and up (screen y grows down)
    p.velocity = vec2<f32>(
        random_range(seed, 15.0, 90.0),
        random_range(seed + 1u, -140.0, -30.0)
    );
    p.phase = random_range(seed + 2u, 0.0, 6.2831853);
    p.pad0 = 0.0;
    p.pad1 = 0.0;
    p.pad2 = 0.0;
    particles[index] = p;
}
"#;

// =============================================================================
// DUST SHADERS - Revealed columns
// =============================================================================

const DUST_VERTEX_WGSL: &str = r#"
// Dust Vertex Shader
// One instance per particle, 6 vertices per instance (two triangles)

struct DustUniforms {
    mvp: mat4x4<f32>,
    width: i32,
    height: i32,
    time: f32,
    size: f32,
    reveal: f32,
    flight: f32,
    pad0: f32,
    pad1: f32,
}

@group(0) @binding(0) var<uniform> dust: DustUniforms;

struct VertexInput {
    @builtin(vertex_index) corner: u32,
    @builtin(instance_index) particle: u32,
    @location(0) color: vec4<f32>,
    @location(1) origin: vec2<f32>,
    @location(2) velocity: vec2<f32>,
    @location(3) phase: f32,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) local: vec2<f32>,
}

const LIFT: f32 = 45.0;

@vertex
fn main(input: VertexInput) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(-0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
    );

    // Each column starts moving when the reveal boundary passes it
    let column = i32(input.particle) / max(dust.height, 1);
    let delay = f32(column) / f32(max(dust.width, 1)) * dust.reveal;
    let t = max(dust.time - delay, 0.0);
    let progress = clamp(t / max(dust.flight, 0.001), 0.0, 1.0);

    let wobble = vec2<f32>(
        sin(input.phase + t * 6.0),
        cos(input.phase * 1.3 + t * 5.0)
    ) * 4.0 * progress;
    let drift = input.velocity * t + vec2<f32>(0.0, -LIFT) * t * t + wobble;

    let corner = corners[input.corner];
    let extent = dust.size * (1.0 - 0.5 * progress);
    let position = input.origin + drift + corner * extent;

    var out: VertexOutput;
    out.position = dust.mvp * vec4<f32>(position, 0.0, 1.0);
    out.color = vec4<f32>(input.color.rgb, input.color.a * (1.0 - progress));
    out.local = corner * 2.0;
    return out;
}
"#;

const DUST_FRAGMENT_WGSL: &str = r#"
// Dust Fragment Shader

struct FragmentInput {
    @location(0) color: vec4<f32>,
    @location(1) local: vec2<f32>,
}

@fragment
fn main(input: FragmentInput) -> @location(0) vec4<f32> {
    // Early discard of spent particles
    if (input.color.a < 0.004) {
        discard;
    }
    return input.color;
}
"#;

// =============================================================================
// SPRITE SHADERS - Unrevealed remainder of the capture
// =============================================================================

const SPRITE_VERTEX_WGSL: &str = r#"
// Sprite Vertex Shader

struct SpriteUniforms {
    mvp: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> sprite: SpriteUniforms;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = sprite.mvp * vec4<f32>(input.position, 0.0, 1.0);
    out.uv = input.uv;
    return out;
}
"#;

const SPRITE_FRAGMENT_WGSL: &str = r#"
// Sprite Fragment Shader

@group(1) @binding(0) var sprite_texture: texture_2d<f32>;
@group(1) @binding(1) var sprite_sampler: sampler;

@fragment
fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(sprite_texture, sprite_sampler, uv);
}
"#;
