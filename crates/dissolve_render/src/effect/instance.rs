//! One in-flight dissolve.

use std::fmt;

use tracing::{debug, trace};

use crate::capture::{Bitmap, Point, Rect};
use crate::error::DissolveResult;
use crate::gpu::{BufferId, BufferUsage, GpuDevice, TextureId, VertexArrayId};
use crate::program::{ProgramSet, ShaderProgram, SpriteVertex, SPRITE_LAYOUT};
use crate::renderer::EffectReport;

use super::grid::GridSpec;
use super::particle::PARTICLE_LAYOUT;
use super::timeline::{micros_to_secs, RevealTimeline};

/// Callback fired once the first frame of an effect has been drawn.
pub type VisibleCallback = Box<dyn FnOnce() + Send>;

/// Byte offset of the two boundary vertices inside the sprite buffer.
const SPRITE_BOUNDARY_OFFSET: u64 = 2 * std::mem::size_of::<SpriteVertex>() as u64;

/// Renderer-assigned effect id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// Outcome of one render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStatus {
    /// Still animating.
    Running {
        /// Particles drawn this frame.
        particles: u32,
        /// Whether the sprite quad was drawn.
        sprite: bool,
    },
    /// Lifetime exceeded; resources can be released.
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct EffectResources {
    texture: TextureId,
    particle_buffer: BufferId,
    particle_vertex_array: VertexArrayId,
    sprite_buffer: BufferId,
    sprite_vertex_array: VertexArrayId,
}

/// One dissolve animation over one capture.
///
/// GPU resources are created in [`DustEffect::spawn`] and released exactly
/// once by [`DustEffect::release`], which consumes the effect.
pub struct DustEffect {
    id: EffectId,
    rect: Rect,
    grid: GridSpec,
    resources: Option<EffectResources>,
    elapsed_us: u64,
    frame_count: u64,
    sprite_quad: [SpriteVertex; 4],
    on_became_visible: Option<VisibleCallback>,
    finished: bool,
}

impl fmt::Debug for DustEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DustEffect")
            .field("id", &self.id)
            .field("rect", &self.rect)
            .field("grid", &self.grid)
            .field("elapsed_us", &self.elapsed_us)
            .field("frame_count", &self.frame_count)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl DustEffect {
    /// Uploads the capture, spawns the particles and builds the sprite quad.
    ///
    /// A capture too small for one cell allocates nothing.
    pub(crate) fn spawn<D: GpuDevice + ?Sized>(
        device: &mut D,
        programs: &mut ProgramSet,
        id: EffectId,
        origin: Point,
        bitmap: &Bitmap,
        particle_size: u32,
        on_became_visible: VisibleCallback,
    ) -> DissolveResult<Self> {
        let rect = Rect::from_origin(origin, bitmap.width(), bitmap.height());
        let grid = GridSpec::for_rect(&rect, particle_size);
        let sprite_quad = initial_quad(&rect);

        let resources = if grid.is_empty() {
            debug!(effect = %id, ?rect, "capture smaller than one particle, nothing to draw");
            None
        } else {
            Some(allocate(device, programs, &rect, &grid, bitmap, &sprite_quad)?)
        };

        debug!(
            effect = %id,
            columns = grid.columns(),
            rows = grid.rows(),
            particles = grid.particle_count(),
            "dust effect spawned"
        );

        Ok(Self {
            id,
            rect,
            grid,
            resources,
            elapsed_us: 0,
            frame_count: 0,
            sprite_quad,
            on_became_visible: Some(on_became_visible),
            finished: false,
        })
    }

    /// Advances by `delta_us` and draws the frame.
    pub(crate) fn render<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        programs: &mut ProgramSet,
        timeline: &RevealTimeline,
        delta_us: u64,
    ) -> DissolveResult<EffectStatus> {
        if self.frame_count == 1 {
            self.fire_visible();
        }
        self.elapsed_us = self.elapsed_us.saturating_add(delta_us);
        self.frame_count += 1;

        let Some(resources) = self.resources else {
            self.fire_visible();
            self.finished = true;
            return Ok(EffectStatus::Finished);
        };

        if timeline.expired(self.elapsed_us) {
            self.finished = true;
            return Ok(EffectStatus::Finished);
        }

        let right_column = timeline.right_column(self.elapsed_us, self.grid.columns());
        let particles = self.grid.particles_in_columns(right_column);
        trace!(
            effect = %self.id,
            progress = timeline.progress(self.elapsed_us),
            right_column,
            particles,
            "dust effect frame"
        );

        programs.dust.activate(device)?;
        programs.dust.set_time(self.elapsed_secs());
        programs
            .dust
            .set_grid(self.grid.columns(), self.grid.rows());
        programs
            .dust
            .draw(device, resources.particle_vertex_array, particles)?;

        let sprite = timeline.sprite_visible(self.elapsed_us);
        if sprite {
            self.move_boundary(right_column);
            device.write_buffer(
                resources.sprite_buffer,
                SPRITE_BOUNDARY_OFFSET,
                bytemuck::cast_slice(&self.sprite_quad[2..]),
            )?;
            programs.sprite.activate(device)?;
            programs
                .sprite
                .draw(device, resources.sprite_vertex_array, resources.texture)?;
        }

        Ok(EffectStatus::Running { particles, sprite })
    }

    /// Releases every GPU resource and reports the run.
    ///
    /// Every release is attempted; the first failure is returned.
    pub(crate) fn release<D: GpuDevice + ?Sized>(
        self,
        device: &mut D,
    ) -> DissolveResult<EffectReport> {
        if let Some(resources) = self.resources {
            let sprite_vertex_array = device.release_vertex_array(resources.sprite_vertex_array);
            let sprite_buffer = device.release_buffer(resources.sprite_buffer);
            let particle_vertex_array =
                device.release_vertex_array(resources.particle_vertex_array);
            let particle_buffer = device.release_buffer(resources.particle_buffer);
            let texture = device.release_texture(resources.texture);
            sprite_vertex_array
                .and(sprite_buffer)
                .and(particle_vertex_array)
                .and(particle_buffer)
                .and(texture)?;
        }
        let report = EffectReport::new(
            self.id,
            self.grid.particle_count(),
            self.frame_count,
            self.elapsed_secs(),
        );
        debug!(
            effect = %self.id,
            particles = report.particles,
            frames = report.frames,
            average_fps = report.average_fps,
            "dust effect finished"
        );
        Ok(report)
    }

    /// Effect id.
    #[must_use]
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Screen rectangle of the capture.
    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Particle grid.
    #[must_use]
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Seconds since spawn.
    #[must_use]
    pub fn elapsed_secs(&self) -> f32 {
        micros_to_secs(self.elapsed_us)
    }

    /// Render calls so far.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// True once the lifetime has run out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current sprite quad, v0..v3.
    #[must_use]
    pub fn sprite_quad(&self) -> &[SpriteVertex; 4] {
        &self.sprite_quad
    }

    fn fire_visible(&mut self) {
        if let Some(callback) = self.on_became_visible.take() {
            debug!(effect = %self.id, "dust effect visible");
            callback();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn move_boundary(&mut self, right_column: u32) {
        let left = self.rect.left as f32
            + (u64::from(right_column) * u64::from(self.grid.particle_size())) as f32;
        let u = right_column as f32 / self.grid.columns().max(1) as f32;
        let top = self.rect.top as f32;
        let bottom = self.rect.bottom() as f32;
        self.sprite_quad[2] = SpriteVertex::new(left, top, u, 0.0);
        self.sprite_quad[3] = SpriteVertex::new(left, bottom, u, 1.0);
    }
}

#[allow(clippy::cast_precision_loss)]
fn initial_quad(rect: &Rect) -> [SpriteVertex; 4] {
    let left = rect.left as f32;
    let right = rect.right() as f32;
    let top = rect.top as f32;
    let bottom = rect.bottom() as f32;
    [
        SpriteVertex::new(right, top, 1.0, 0.0),
        SpriteVertex::new(right, bottom, 1.0, 1.0),
        SpriteVertex::new(left, top, 0.0, 0.0),
        SpriteVertex::new(left, bottom, 0.0, 1.0),
    ]
}

#[allow(clippy::cast_precision_loss)]
fn allocate<D: GpuDevice + ?Sized>(
    device: &mut D,
    programs: &mut ProgramSet,
    rect: &Rect,
    grid: &GridSpec,
    bitmap: &Bitmap,
    sprite_quad: &[SpriteVertex; 4],
) -> DissolveResult<EffectResources> {
    let texture = device.create_texture(bitmap)?;
    device.bind_texture(texture)?;

    let particle_buffer = device.create_buffer(grid.particle_buffer_size(), BufferUsage::Particles)?;
    let half = grid.particle_size() as f32 / 2.0;
    programs.spawn.activate(device)?;
    programs
        .spawn
        .set_origin(rect.left as f32 + half, rect.top as f32 + half);
    programs.spawn.set_grid(grid.columns(), grid.rows());
    programs
        .spawn
        .dispatch(device, particle_buffer, grid.dispatch_size())?;
    let particle_vertex_array = device.create_vertex_array(particle_buffer, PARTICLE_LAYOUT)?;

    let quad_bytes: &[u8] = bytemuck::cast_slice(sprite_quad);
    let sprite_buffer = device.create_buffer(quad_bytes.len() as u64, BufferUsage::Vertices)?;
    device.write_buffer(sprite_buffer, 0, &quad_bytes[..SPRITE_BOUNDARY_OFFSET as usize])?;
    let sprite_vertex_array = device.create_vertex_array(sprite_buffer, SPRITE_LAYOUT)?;

    Ok(EffectResources {
        texture,
        particle_buffer,
        particle_vertex_array,
        sprite_buffer,
        sprite_vertex_array,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::gpu::{GpuCommand, RecordingDevice};
    use crate::shaders::ShaderSources;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn setup() -> (RecordingDevice, ProgramSet) {
        let mut device = RecordingDevice::new();
        let config = RendererConfig {
            particle_size: 10,
            ..RendererConfig::default()
        };
        let programs = ProgramSet::compile(&mut device, &ShaderSources::default(), &config).unwrap();
        (device, programs)
    }

    fn counter() -> (Arc<AtomicUsize>, VisibleCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn frame(
        device: &mut RecordingDevice,
        programs: &mut ProgramSet,
        effect: &mut DustEffect,
        delta_us: u64,
    ) -> EffectStatus {
        device.begin_frame().unwrap();
        let status = effect
            .render(device, programs, &RevealTimeline::default(), delta_us)
            .unwrap();
        device.end_frame().unwrap();
        status
    }

    #[test]
    fn test_spawn_allocates_and_dispatches_once() {
        let (mut device, mut programs) = setup();
        let (_, callback) = counter();
        let bitmap = Bitmap::solid(40, 30, [200, 10, 10, 255]);
        let effect = DustEffect::spawn(
            &mut device,
            &mut programs,
            EffectId::new(1),
            Point::new(5, 7),
            &bitmap,
            10,
            callback,
        )
        .unwrap();

        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.live_buffers(), 2);
        assert_eq!(device.live_vertex_arrays(), 2);
        let dispatches: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::DispatchCompute { groups, uniforms, .. } => Some((*groups, uniforms.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].0, [1, 1, 1]);
        let uniforms: crate::program::SpawnUniforms = bytemuck::pod_read_unaligned(&dispatches[0].1);
        assert!((uniforms.left - 10.0).abs() < f32::EPSILON);
        assert!((uniforms.top - 12.0).abs() < f32::EPSILON);
        assert_eq!((uniforms.width, uniforms.height, uniforms.stride), (4, 3, 10));

        effect.release(&mut device).unwrap();
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);
    }

    #[test]
    fn test_visible_fires_on_second_render() {
        let (mut device, mut programs) = setup();
        let (count, callback) = counter();
        let bitmap = Bitmap::solid(40, 30, [255; 4]);
        let mut effect = DustEffect::spawn(
            &mut device,
            &mut programs,
            EffectId::new(1),
            Point::default(),
            &bitmap,
            10,
            callback,
        )
        .unwrap();

        frame(&mut device, &mut programs, &mut effect, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        frame(&mut device, &mut programs, &mut effect, 16_000);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        frame(&mut device, &mut programs, &mut effect, 16_000);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sprite_boundary_tracks_reveal() {
        let (mut device, mut programs) = setup();
        let (_, callback) = counter();
        let bitmap = Bitmap::solid(40, 30, [255; 4]);
        let mut effect = DustEffect::spawn(
            &mut device,
            &mut programs,
            EffectId::new(1),
            Point::new(100, 50),
            &bitmap,
            10,
            callback,
        )
        .unwrap();

        let status = frame(&mut device, &mut programs, &mut effect, 100_000);
        assert_eq!(
            status,
            EffectStatus::Running {
                particles: 6,
                sprite: true
            }
        );
        let quad = effect.sprite_quad();
        assert_eq!(quad[0], SpriteVertex::new(140.0, 50.0, 1.0, 0.0));
        assert_eq!(quad[1], SpriteVertex::new(140.0, 80.0, 1.0, 1.0));
        assert_eq!(quad[2], SpriteVertex::new(120.0, 50.0, 0.5, 0.0));
        assert_eq!(quad[3], SpriteVertex::new(120.0, 80.0, 0.5, 1.0));

        let boundary_write = device.commands().iter().rev().find_map(|c| match c {
            GpuCommand::WriteBuffer { offset, data, .. } => Some((*offset, data.len())),
            _ => None,
        });
        assert_eq!(boundary_write, Some((32, 32)));
    }

    #[test]
    fn test_degenerate_capture_finishes_immediately() {
        let (mut device, mut programs) = setup();
        let (count, callback) = counter();
        let bitmap = Bitmap::solid(9, 200, [255; 4]);
        let mut effect = DustEffect::spawn(
            &mut device,
            &mut programs,
            EffectId::new(3),
            Point::default(),
            &bitmap,
            10,
            callback,
        )
        .unwrap();
        assert_eq!(device.live_buffers(), 0);

        let status = frame(&mut device, &mut programs, &mut effect, 16_000);
        assert_eq!(status, EffectStatus::Finished);
        assert!(effect.is_finished());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let report = effect.release(&mut device).unwrap();
        assert_eq!(report.particles, 0);
    }
}
