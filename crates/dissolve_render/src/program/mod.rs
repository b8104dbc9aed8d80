//! Shader programs.
//!
//! Each program owns a device handle plus a CPU copy of its uniform block.
//! Setters only touch the copy; the block reaches the device right before
//! the next dispatch or draw, and only when it changed.

pub mod dust;
pub mod spawn;
pub mod sprite;

use bytemuck::Pod;
use tracing::{debug, warn};

use crate::config::RendererConfig;
use crate::error::DissolveResult;
use crate::gpu::{GpuDevice, ProgramId};
use crate::shaders::ShaderSources;

pub use dust::{DustProgram, DustUniforms};
pub use spawn::{SpawnProgram, SpawnUniforms};
pub use sprite::{SpriteProgram, SpriteUniforms, SpriteVertex, SPRITE_LAYOUT};

/// Device program plus the label it was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHandle {
    id: ProgramId,
    label: &'static str,
}

impl ProgramHandle {
    /// Wraps a created program.
    #[must_use]
    pub const fn new(id: ProgramId, label: &'static str) -> Self {
        Self { id, label }
    }

    /// Device handle.
    #[must_use]
    pub const fn id(&self) -> ProgramId {
        self.id
    }

    /// Program label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }
}

/// Behaviour shared by every program.
pub trait ShaderProgram {
    /// The underlying device program.
    fn handle(&self) -> ProgramHandle;

    /// Makes this program current.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    fn activate<D: GpuDevice + ?Sized>(&self, device: &mut D) -> DissolveResult<()> {
        device.use_program(self.handle().id())
    }

    /// Releases the device program.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    fn release<D: GpuDevice + ?Sized>(self, device: &mut D) -> DissolveResult<()>
    where
        Self: Sized,
    {
        let handle = self.handle();
        debug!(label = handle.label(), "releasing program");
        device.release_program(handle.id())
    }
}

/// CPU copy of a uniform block with a dirty flag.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UniformBlock<T: Pod> {
    value: T,
    dirty: bool,
}

impl<T: Pod> UniformBlock<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value, dirty: true }
    }

    pub(crate) const fn get(&self) -> &T {
        &self.value
    }

    pub(crate) fn update(&mut self, apply: impl FnOnce(&mut T)) {
        let before = self.value;
        apply(&mut self.value);
        if bytemuck::bytes_of(&before) != bytemuck::bytes_of(&self.value) {
            self.dirty = true;
        }
    }

    pub(crate) fn flush<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        program: ProgramId,
    ) -> DissolveResult<()> {
        if self.dirty {
            device.set_uniforms(program, bytemuck::bytes_of(&self.value))?;
            self.dirty = false;
        }
        Ok(())
    }
}

/// The three programs shared by every effect.
#[derive(Debug)]
pub struct ProgramSet {
    /// Compute program filling particle buffers.
    pub spawn: SpawnProgram,
    /// Point-sprite program for revealed columns.
    pub dust: DustProgram,
    /// Textured quad for the unrevealed remainder.
    pub sprite: SpriteProgram,
}

impl ProgramSet {
    /// Compiles all three programs and uploads their constant uniforms.
    ///
    /// Programs built before a failure are released again.
    ///
    /// # Errors
    ///
    /// The first compile, link or upload failure.
    pub fn compile<D: GpuDevice + ?Sized>(
        device: &mut D,
        shaders: &ShaderSources,
        config: &RendererConfig,
    ) -> DissolveResult<Self> {
        let mut spawn = SpawnProgram::compile(device, &shaders.spawn)?;
        let mut dust = match DustProgram::compile(device, &shaders.dust_vertex, &shaders.dust_fragment)
        {
            Ok(dust) => dust,
            Err(err) => {
                discard(device, spawn);
                return Err(err);
            }
        };
        let sprite = match SpriteProgram::compile(
            device,
            &shaders.sprite_vertex,
            &shaders.sprite_fragment,
        ) {
            Ok(sprite) => sprite,
            Err(err) => {
                discard(device, spawn);
                discard(device, dust);
                return Err(err);
            }
        };

        spawn.set_stride(config.particle_size);
        dust.set_size(config.particle_size as f32);
        dust.set_timing(config.reveal_secs, config.lifetime_secs - config.reveal_secs);
        let mut set = Self {
            spawn,
            dust,
            sprite,
        };
        let uploaded = set.spawn.flush(device).and_then(|()| set.dust.flush(device));
        if let Err(err) = uploaded {
            if let Err(release_err) = set.release(device) {
                warn!(%release_err, "failed to release programs after upload error");
            }
            return Err(err);
        }
        Ok(set)
    }

    /// Uploads a new projection to dust and sprite.
    ///
    /// # Errors
    ///
    /// Propagates the device failure.
    pub fn set_projection<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        mvp: &[f32; 16],
    ) -> DissolveResult<()> {
        self.dust.set_mvp(mvp);
        self.sprite.set_mvp(mvp);
        self.dust.flush(device)?;
        self.sprite.flush(device)
    }

    /// Releases all three programs.
    ///
    /// # Errors
    ///
    /// The first release failure; later programs are still released.
    pub fn release<D: GpuDevice + ?Sized>(self, device: &mut D) -> DissolveResult<()> {
        let spawn = self.spawn.release(device);
        let dust = self.dust.release(device);
        let sprite = self.sprite.release(device);
        spawn.and(dust).and(sprite)
    }
}

fn discard<D: GpuDevice + ?Sized, P: ShaderProgram>(device: &mut D, program: P) {
    let label = program.handle().label();
    if let Err(err) = program.release(device) {
        warn!(label, %err, "failed to release program after init error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DissolveError, ShaderStage};
    use crate::gpu::{GpuCommand, InjectedFailure, RecordingDevice};

    #[test]
    fn test_compile_uploads_constants() {
        let mut device = RecordingDevice::new();
        let config = RendererConfig {
            particle_size: 5,
            ..RendererConfig::default()
        };
        let set = ProgramSet::compile(&mut device, &ShaderSources::default(), &config).unwrap();
        assert_eq!(device.live_programs(), 3);
        assert_eq!(set.spawn.uniforms().stride, 5);
        assert!((set.dust.uniforms().size - 5.0).abs() < f32::EPSILON);

        let spawn_block = device.uniforms(set.spawn.handle().id()).unwrap();
        assert_eq!(spawn_block, bytemuck::bytes_of(set.spawn.uniforms()));
    }

    #[test]
    fn test_dust_timing_follows_config() {
        let mut device = RecordingDevice::new();
        let config = RendererConfig {
            lifetime_secs: 4.0,
            reveal_secs: 1.0,
            ..RendererConfig::default()
        };
        let set = ProgramSet::compile(&mut device, &ShaderSources::default(), &config).unwrap();

        let block = device.uniforms(set.dust.handle().id()).unwrap();
        assert_eq!(block, bytemuck::bytes_of(set.dust.uniforms()));
        let uniforms: DustUniforms = bytemuck::pod_read_unaligned(block);
        assert!((uniforms.reveal - 1.0).abs() < f32::EPSILON);
        assert!((uniforms.flight - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_failed_upload_releases_programs() {
        let mut device = RecordingDevice::new();
        device.inject_failure(InjectedFailure::Call {
            operation: "set_uniforms",
        });
        let result = ProgramSet::compile(
            &mut device,
            &ShaderSources::default(),
            &RendererConfig::default(),
        );
        assert!(result.is_err());
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_failed_compile_releases_earlier_programs() {
        let mut device = RecordingDevice::new();
        device.inject_failure(InjectedFailure::ShaderCompile {
            program: SpriteProgram::LABEL,
            stage: ShaderStage::Fragment,
        });
        let err = ProgramSet::compile(
            &mut device,
            &ShaderSources::default(),
            &RendererConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DissolveError::ShaderCompile { .. }));
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_uniform_block_flushes_only_changes() {
        let mut device = RecordingDevice::new();
        let mut set = ProgramSet::compile(
            &mut device,
            &ShaderSources::default(),
            &RendererConfig::default(),
        )
        .unwrap();
        device.take_commands();

        set.set_projection(&mut device, &[1.0; 16]).unwrap();
        set.set_projection(&mut device, &[1.0; 16]).unwrap();
        let uploads = device
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::SetUniforms { .. }))
            .count();
        assert_eq!(uploads, 2);

        set.release(&mut device).unwrap();
        assert_eq!(device.live_programs(), 0);
    }
}
