//! # DISSOLVE Demo
//!
//! A window whose surface is the overlay. Left click dissolves a sample card
//! centred on the cursor; Escape quits.
//!
//! Optional first argument: path to an overlay TOML config.
//! Log level via `RUST_LOG` (default `info`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dissolve::render::WgpuDevice;
use dissolve::{sample_card, DustOverlay, OverlayConfig, OverlayHost, Point};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

const CARD_SIZE: (u32, u32) = (240, 120);
const TINTS: [[u8; 3]; 4] = [[240, 90, 70], [70, 160, 240], [90, 200, 120], [230, 200, 60]];

/// Window-backed host: visibility is tracked, detaching ends the demo.
#[derive(Default)]
struct DemoHost {
    visible: AtomicBool,
    detached: AtomicBool,
}

impl OverlayHost for DemoHost {
    fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::AcqRel) != visible {
            info!(visible, "overlay visibility changed");
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    fn detach(&self) {
        warn!("overlay detached");
        self.detached.store(true, Ordering::Release);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!(error = %err, "dissolve demo failed");
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => OverlayConfig::load(path)?,
        None => OverlayConfig::default(),
    };

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("DISSOLVE Demo")
            .with_inner_size(PhysicalSize::new(1280, 720))
            .with_transparent(true)
            .build(&event_loop)?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let surface = instance.create_surface(window.clone())?;
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .ok_or("no compatible GPU adapter")?;

    let capabilities = surface.get_capabilities(&adapter);
    let format = capabilities
        .formats
        .first()
        .copied()
        .ok_or("surface reports no formats")?;
    let alpha_mode = if capabilities
        .alpha_modes
        .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
    {
        wgpu::CompositeAlphaMode::PreMultiplied
    } else {
        wgpu::CompositeAlphaMode::Auto
    };

    let device = WgpuDevice::from_adapter(&adapter, format)?;
    let size = window.inner_size();
    let mut surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(device.raw_device(), &surface_config);

    let host = Arc::new(DemoHost::default());
    let (overlay, mut overlay_surface) = DustOverlay::create(device, host.clone(), &config)?;
    overlay.set_on_became_idle(|| info!("all dissolves finished"));

    overlay_surface.surface_created();
    overlay_surface.surface_changed(surface_config.width, surface_config.height);

    let mut cursor = PhysicalPosition::new(0.0_f64, 0.0_f64);
    let mut started: usize = 0;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(KeyCode::Escape),
                            ..
                        },
                    ..
                } => elwt.exit(),
                WindowEvent::CursorMoved { position, .. } => cursor = position,
                WindowEvent::MouseInput {
                    button: MouseButton::Left,
                    state: ElementState::Pressed,
                    ..
                } => {
                    let (width, height) = CARD_SIZE;
                    let origin = card_origin(cursor, width, height);
                    let tint = TINTS[started % TINTS.len()];
                    started += 1;
                    let effect = started;
                    let queued = overlay.start(origin, sample_card(width, height, tint), move || {
                        info!(effect, "dissolve on screen");
                    });
                    if !queued {
                        warn!(effect, "dissolve not started");
                    }
                }
                WindowEvent::Resized(new_size) => {
                    if new_size.width > 0 && new_size.height > 0 {
                        surface_config.width = new_size.width;
                        surface_config.height = new_size.height;
                        surface.configure(
                            overlay_surface.renderer().device().raw_device(),
                            &surface_config,
                        );
                        overlay_surface.surface_changed(new_size.width, new_size.height);
                    }
                }
                WindowEvent::RedrawRequested => {
                    let output = match surface.get_current_texture() {
                        Ok(texture) => texture,
                        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            surface.configure(
                                overlay_surface.renderer().device().raw_device(),
                                &surface_config,
                            );
                            return;
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            error!("out of GPU memory");
                            elwt.exit();
                            return;
                        }
                        Err(wgpu::SurfaceError::Timeout) => return,
                    };
                    let view = output
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    overlay_surface.renderer_mut().device_mut().set_target(
                        view,
                        surface_config.width,
                        surface_config.height,
                    );
                    overlay_surface.draw_frame(Instant::now());
                    overlay_surface.renderer_mut().device_mut().clear_target();
                    output.present();
                }
                _ => {}
            },
            Event::AboutToWait => {
                overlay.ui_queue().run_pending();
                if host.detached.load(Ordering::Acquire) {
                    elwt.exit();
                    return;
                }
                window.request_redraw();
            }
            Event::LoopExiting => {
                overlay_surface.dispose();
                info!(effects = started, "dissolve demo exiting");
            }
            _ => {}
        }
    })?;
    Ok(())
}

/// Top-left corner that centres a `width x height` card on the cursor.
#[allow(clippy::cast_possible_truncation)]
fn card_origin(cursor: PhysicalPosition<f64>, width: u32, height: u32) -> Point {
    let half_width = i32::try_from(width / 2).unwrap_or(0);
    let half_height = i32::try_from(height / 2).unwrap_or(0);
    Point::new(
        cursor.x.round() as i32 - half_width,
        cursor.y.round() as i32 - half_height,
    )
}
