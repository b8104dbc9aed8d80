//! # Renderer State Integration Test
//!
//! Init failures, surface changes and teardown against the recording device.

use dissolve_render::effect::Particle;
use dissolve_render::gpu::{ApiVersion, GpuCapabilities};
use dissolve_render::{
    Bitmap, DissolveError, DustRenderer, GpuCommand, InjectedFailure, Point, Projection,
    RecordingDevice, RendererConfig, RendererPhase, ShaderSources, ShaderStage,
};

fn uninit() -> DustRenderer<RecordingDevice> {
    DustRenderer::new(RecordingDevice::new(), RendererConfig::default()).unwrap()
}

#[test]
fn test_resize_matches_direct_projection() {
    let mut renderer = uninit();
    renderer.init().unwrap();
    renderer.resize(0, 0).unwrap();
    renderer.resize(1080, 1920).unwrap();

    let expected = Projection::orthographic(1080, 1920);
    assert_eq!(renderer.projection(), &expected);
    assert_eq!(renderer.device().viewport(), (1080, 1920));

    let device = renderer.device();
    for label in ["dust", "sprite"] {
        let program = device.program_by_label(label).unwrap();
        let block = device.uniforms(program).unwrap();
        let mvp: &[u8] = bytemuck::cast_slice(expected.matrix());
        assert_eq!(&block[..64], mvp, "{label} projection");
    }
}

#[test]
fn test_shader_failure_leaves_renderer_failed() {
    let mut renderer = uninit();
    renderer
        .device_mut()
        .inject_failure(InjectedFailure::ShaderCompile {
            program: "dust",
            stage: ShaderStage::Fragment,
        });
    let err = renderer.init().unwrap_err();
    assert!(matches!(
        err,
        DissolveError::ShaderCompile {
            stage: ShaderStage::Fragment,
            ..
        }
    ));
    assert_eq!(renderer.phase(), RendererPhase::Failed);
    assert_eq!(renderer.device().live_programs(), 0);

    renderer.device_mut().take_commands();
    let started = renderer
        .start(Point::default(), &Bitmap::solid(8, 8, [255; 4]), Box::new(|| {}))
        .unwrap();
    assert!(!started);
    renderer.render(0.016).unwrap();
    renderer.resize(10, 10).unwrap();
    renderer.dispose().unwrap();
    assert!(renderer.device().commands().is_empty());
    assert_eq!(renderer.phase(), RendererPhase::Disposed);
}

#[test]
fn test_link_failure_is_reported() {
    let mut renderer = uninit();
    renderer
        .device_mut()
        .inject_failure(InjectedFailure::ProgramLink { program: "sprite" });
    assert!(matches!(
        renderer.init(),
        Err(DissolveError::ProgramLink { program: "sprite", .. })
    ));
    assert_eq!(renderer.device().live_programs(), 0);
}

#[test]
fn test_unsupported_platform() {
    let device = RecordingDevice::with_capabilities(GpuCapabilities {
        backend: "gles".into(),
        api_version: Some(ApiVersion::new(2, 0)),
        compute_shaders: false,
    });
    let mut renderer = DustRenderer::new(device, RendererConfig::default()).unwrap();
    let err = renderer.init().unwrap_err();
    assert!(matches!(err, DissolveError::UnsupportedPlatform { .. }));
    assert!(!renderer.is_ready());
}

#[test]
fn test_failed_start_disables_renderer() {
    let mut renderer = uninit();
    renderer.init().unwrap();
    renderer.resize(200, 200).unwrap();
    renderer
        .device_mut()
        .inject_failure(InjectedFailure::Call {
            operation: "create_texture",
        });
    let result = renderer.start(Point::new(4, 4), &Bitmap::solid(20, 20, [255; 4]), Box::new(|| {}));
    assert!(matches!(result, Err(DissolveError::GpuCall { operation: "create_texture", .. })));
    assert_eq!(renderer.phase(), RendererPhase::Failed);
    assert!(renderer.effects().is_empty());
}

#[test]
fn test_dispose_mid_effect_releases_all_handles() {
    let mut renderer = uninit();
    renderer.init().unwrap();
    renderer.resize(640, 480).unwrap();
    let bitmap = Bitmap::solid(30, 30, [90, 90, 90, 255]);
    for x in 0..3 {
        renderer
            .start(Point::new(x * 40, 0), &bitmap, Box::new(|| {}))
            .unwrap();
    }
    renderer.render(0.05).unwrap();

    let particle_bytes: u64 = renderer
        .device()
        .commands()
        .iter()
        .filter_map(|c| match c {
            GpuCommand::CreateBuffer { size, .. } if *size > 64 => Some(*size),
            _ => None,
        })
        .sum();
    assert_eq!(particle_bytes, 3 * 15 * 15 * Particle::STRIDE);

    renderer.dispose().unwrap();
    let device = renderer.device();
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_vertex_arrays(), 0);
    assert!(renderer.effects().is_empty());

    let before = renderer.device().commands().len();
    renderer.dispose().unwrap();
    renderer.render(0.016).unwrap();
    assert_eq!(renderer.device().commands().len(), before);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = RendererConfig {
        particle_size: 0,
        ..RendererConfig::default()
    };
    assert!(matches!(
        DustRenderer::new(RecordingDevice::new(), config),
        Err(DissolveError::Config(_))
    ));
}

#[test]
fn test_dispose_after_runtime_failure_releases_each_handle_once() {
    let mut renderer = uninit();
    renderer.init().unwrap();
    renderer.resize(640, 480).unwrap();
    let bitmap = Bitmap::solid(24, 24, [200, 40, 40, 255]);
    for x in 0..2 {
        renderer
            .start(Point::new(x * 30, 0), &bitmap, Box::new(|| {}))
            .unwrap();
    }
    renderer.render(0.05).unwrap();
    renderer
        .device_mut()
        .inject_failure(InjectedFailure::Call { operation: "draw" });
    assert!(matches!(
        renderer.render(0.05),
        Err(DissolveError::GpuCall { operation: "draw", .. })
    ));
    assert_eq!(renderer.phase(), RendererPhase::Failed);
    assert_eq!(renderer.device().live_textures(), 2);

    renderer.device_mut().take_commands();
    renderer.dispose().unwrap();
    assert_eq!(renderer.phase(), RendererPhase::Disposed);
    let device = renderer.device();
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_vertex_arrays(), 0);

    let count = |is: fn(&GpuCommand) -> bool| device.commands().iter().filter(|c| is(c)).count();
    assert_eq!(count(|c| matches!(c, GpuCommand::ReleaseProgram(_))), 3);
    assert_eq!(count(|c| matches!(c, GpuCommand::ReleaseTexture(_))), 2);
    assert_eq!(count(|c| matches!(c, GpuCommand::ReleaseBuffer(_))), 4);
    assert_eq!(count(|c| matches!(c, GpuCommand::ReleaseVertexArray(_))), 4);

    renderer.device_mut().take_commands();
    renderer.dispose().unwrap();
    assert!(renderer.device().commands().is_empty());
}

#[test]
fn test_replacement_shader_reaches_device() {
    let shaders = ShaderSources {
        sprite_vertex: "  ".into(),
        ..ShaderSources::default()
    };
    let mut renderer = uninit().with_shaders(shaders);
    assert!(matches!(
        renderer.init(),
        Err(DissolveError::ShaderCompile {
            stage: ShaderStage::Vertex,
            ..
        })
    ));
    assert_eq!(renderer.phase(), RendererPhase::Failed);
    assert_eq!(renderer.device().live_programs(), 0);
}
