// src/renderer.rs
//! Lifecycle of the animated background.
//!
//! A [`ParticleRenderer`] owns its surface and its particles between `start` and
//! `stop`. Frames are driven from outside (one per display refresh): the host asks
//! for a [`FrameToken`] when it schedules a frame and hands it back when the frame
//! fires. Tokens carry the lifecycle generation, so a frame queued before `stop`
//! is rejected even if the host delivers it afterwards.

use instant::Instant;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::FieldConfig;
use crate::field::ParticleField;
use crate::scene::FrameGeometry;
use crate::theme::{Palette, ThemeMode};
use crate::viewport::logical_size;

/// Where frames are painted. Implemented by the wgpu surface and by test doubles.
pub trait DrawSurface {
    /// Resizes the backing buffer to `width`x`height` physical pixels. Geometry
    /// arrives in logical pixels, `scale_factor` physical pixels each. Never
    /// called with a zero dimension.
    fn resize(&mut self, width: u32, height: u32, scale_factor: f64);
    /// Clears to the palette background and draws `geometry`.
    fn present(&mut self, geometry: &FrameGeometry, palette: &Palette) -> Result<(), wgpu::SurfaceError>;
    /// Recreates the swap chain after it was lost or went stale.
    fn reconfigure(&mut self);
}

/// Permission to run exactly one frame of a specific renderer generation.
/// `run_frame` consumes it, and it cannot be copied:
///
/// ```compile_fail
/// fn duplicate(token: particlefield::renderer::FrameToken) {
///     let _again = token.clone();
/// }
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct FrameToken {
    generation: u64,
}

struct Running<S> {
    surface: S,
    physical_size: (u32, u32),
    field: ParticleField,
    mode: ThemeMode,
    palette: Palette,
    geometry: FrameGeometry,
}

impl<S: DrawSurface> Running<S> {
    fn apply_size(&mut self, width: u32, height: u32, scale_factor: f64) {
        self.physical_size = (width, height);
        self.surface.resize(width, height, scale_factor);
        self.field.resize(logical_size(width, height, scale_factor));
    }
}

enum Lifecycle<S> {
    Idle,
    Running(Box<Running<S>>),
    Stopped,
}

#[derive(Debug)]
pub struct FrameStats {
    pub last_frame_instant: Instant,
    pub frame_count_in_second: u32,
    pub current_fps: u32,
    pub total_frames: u64,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            last_frame_instant: Instant::now(),
            frame_count_in_second: 0,
            current_fps: 0,
            total_frames: 0,
        }
    }

    fn tick(&mut self) {
        self.total_frames += 1;
        self.frame_count_in_second += 1;
        let now = Instant::now();
        if (now - self.last_frame_instant).as_secs_f32() >= 1.0 {
            self.current_fps = self.frame_count_in_second;
            self.frame_count_in_second = 0;
            self.last_frame_instant = now;
        }
    }
}

pub struct ParticleRenderer<S: DrawSurface> {
    config: FieldConfig,
    lifecycle: Lifecycle<S>,
    generation: u64,
    scale_factor: f64,
    stats: FrameStats,
}

impl<S: DrawSurface> ParticleRenderer<S> {
    /// An invalid `config` is replaced by the defaults.
    pub fn new(config: FieldConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                log::warn!("Invalid field config, using defaults: {:#}", e);
                FieldConfig::default()
            }
        };
        Self {
            config,
            lifecycle: Lifecycle::Idle,
            generation: 0,
            scale_factor: 1.0,
            stats: FrameStats::new(),
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Creates the population and starts accepting frames. `width` and `height`
    /// are physical pixels; the particles live in logical pixels at the current
    /// scale factor.
    ///
    /// Without a surface this does nothing: the page simply has no animated
    /// background. Starting an already running renderer is ignored.
    pub fn start(&mut self, surface: Option<S>, width: u32, height: u32, mode: ThemeMode) {
        self.start_with_rng(surface, width, height, mode, &mut SmallRng::from_entropy());
    }

    pub fn start_with_rng<R: Rng + ?Sized>(
        &mut self,
        surface: Option<S>,
        width: u32,
        height: u32,
        mode: ThemeMode,
        rng: &mut R,
    ) {
        if self.is_running() {
            log::warn!("Particle renderer is already running; ignoring start.");
            return;
        }
        let Some(mut surface) = surface else {
            log::warn!("No drawing surface available; particle background disabled.");
            return;
        };

        if width > 0 && height > 0 {
            surface.resize(width, height, self.scale_factor);
        }
        let bounds = logical_size(width, height, self.scale_factor);
        let field = ParticleField::new(self.config.clone(), bounds, rng);
        log::info!(
            "Particle renderer started: {} particles, {}x{} at scale {}, {} palette",
            field.particles().len(),
            width,
            height,
            self.scale_factor,
            mode
        );

        self.lifecycle = Lifecycle::Running(Box::new(Running {
            surface,
            physical_size: (width, height),
            field,
            mode,
            palette: mode.palette(),
            geometry: FrameGeometry::default(),
        }));
        self.stats = FrameStats::new();
    }

    /// Applies a new physical size to the surface and the wrap domain at once.
    /// Particle state is untouched.
    pub fn resize(&mut self, width: u32, height: u32) {
        let scale_factor = self.scale_factor;
        let Lifecycle::Running(running) = &mut self.lifecycle else {
            return;
        };
        if width == 0 || height == 0 {
            log::debug!("Ignoring zero-sized resize {}x{}", width, height);
            return;
        }
        running.apply_size(width, height, scale_factor);
    }

    /// Physical pixels per logical pixel. Applies to a running field at once
    /// and to every later `start`.
    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            log::warn!("Ignoring invalid scale factor {}", scale_factor);
            return;
        }
        self.scale_factor = scale_factor;
        if let Lifecycle::Running(running) = &mut self.lifecycle {
            let (width, height) = running.physical_size;
            if width > 0 && height > 0 {
                running.apply_size(width, height, scale_factor);
            }
        }
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Swaps the palette for subsequent frames.
    pub fn set_palette(&mut self, mode: ThemeMode) {
        if let Lifecycle::Running(running) = &mut self.lifecycle {
            running.mode = mode;
            running.palette = mode.palette();
        }
    }

    /// Releases the surface and the particles and invalidates queued frames.
    /// Calling it again has no effect.
    pub fn stop(&mut self) {
        if let Lifecycle::Running(_) = self.lifecycle {
            self.lifecycle = Lifecycle::Stopped;
            self.generation += 1;
            log::info!("Particle renderer stopped after {} frames.", self.stats.total_frames);
        }
    }

    /// A token for the next frame, or `None` when not running.
    pub fn request_frame(&self) -> Option<FrameToken> {
        self.is_running().then_some(FrameToken { generation: self.generation })
    }

    /// Runs one frame: step, build geometry, paint. Returns whether another frame
    /// should be scheduled.
    pub fn run_frame(&mut self, token: FrameToken) -> bool {
        if token.generation != self.generation {
            log::debug!("Discarding stale frame from generation {}", token.generation);
            return false;
        }
        let Lifecycle::Running(running) = &mut self.lifecycle else {
            return false;
        };

        running.field.step();
        running.geometry.rebuild(&running.field, &running.palette);

        match running.surface.present(&running.geometry, &running.palette) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::info!("Surface lost or outdated; reconfiguring.");
                running.surface.reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of GPU memory; stopping particle renderer.");
                self.stop();
                return false;
            }
            Err(e) => log::warn!("Dropped frame: {:?}", e),
        }

        self.stats.tick();
        true
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Stopped)
    }

    pub fn field(&self) -> Option<&ParticleField> {
        match &self.lifecycle {
            Lifecycle::Running(running) => Some(&running.field),
            _ => None,
        }
    }

    pub fn surface(&self) -> Option<&S> {
        match &self.lifecycle {
            Lifecycle::Running(running) => Some(&running.surface),
            _ => None,
        }
    }

    pub fn mode(&self) -> Option<ThemeMode> {
        match &self.lifecycle {
            Lifecycle::Running(running) => Some(running.mode),
            _ => None,
        }
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingSurface {
        presents: usize,
        reconfigures: usize,
        size: (u32, u32),
        scale_factor: f64,
        fail_with: Option<wgpu::SurfaceError>,
    }

    impl DrawSurface for CountingSurface {
        fn resize(&mut self, width: u32, height: u32, scale_factor: f64) {
            self.size = (width, height);
            self.scale_factor = scale_factor;
        }

        fn present(&mut self, _geometry: &FrameGeometry, _palette: &Palette) -> Result<(), wgpu::SurfaceError> {
            self.presents += 1;
            match self.fail_with.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn reconfigure(&mut self) {
            self.reconfigures += 1;
        }
    }

    fn running(surface: CountingSurface) -> ParticleRenderer<CountingSurface> {
        let mut renderer = ParticleRenderer::new(FieldConfig::default());
        let mut rng = SmallRng::seed_from_u64(5);
        renderer.start_with_rng(Some(surface), 1280, 720, ThemeMode::Dark, &mut rng);
        renderer
    }

    #[test]
    fn test_start_sizes_surface() {
        let renderer = running(CountingSurface::default());
        assert!(renderer.is_running());
        assert_eq!(renderer.surface().unwrap().size, (1280, 720));
        assert_eq!(renderer.field().unwrap().particles().len(), 80);
    }

    #[test]
    fn test_lost_surface_is_reconfigured() {
        let mut renderer = running(CountingSurface {
            fail_with: Some(wgpu::SurfaceError::Lost),
            ..Default::default()
        });
        let token = renderer.request_frame().unwrap();
        assert!(renderer.run_frame(token));
        assert_eq!(renderer.surface().unwrap().reconfigures, 1);
        assert!(renderer.is_running());
    }

    #[test]
    fn test_out_of_memory_stops() {
        let mut renderer = running(CountingSurface {
            fail_with: Some(wgpu::SurfaceError::OutOfMemory),
            ..Default::default()
        });
        let token = renderer.request_frame().unwrap();
        assert!(!renderer.run_frame(token));
        assert!(renderer.is_stopped());
        assert!(renderer.request_frame().is_none());
    }

    #[test]
    fn test_timeout_drops_frame_but_keeps_running() {
        let mut renderer = running(CountingSurface {
            fail_with: Some(wgpu::SurfaceError::Timeout),
            ..Default::default()
        });
        let token = renderer.request_frame().unwrap();
        assert!(renderer.run_frame(token));
        let token = renderer.request_frame().unwrap();
        assert!(renderer.run_frame(token));
        assert_eq!(renderer.surface().unwrap().presents, 2);
    }

    #[test]
    fn test_set_palette_keeps_particles() {
        let mut renderer = running(CountingSurface::default());
        let before = renderer.field().unwrap().particles().to_vec();
        renderer.set_palette(ThemeMode::Light);
        assert_eq!(renderer.mode(), Some(ThemeMode::Light));
        assert_eq!(renderer.field().unwrap().particles(), before.as_slice());
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let config = FieldConfig {
            speed_range: [0.0, 0.0],
            ..FieldConfig::default()
        };
        let mut renderer: ParticleRenderer<CountingSurface> = ParticleRenderer::new(config);
        assert_eq!(renderer.config(), &FieldConfig::default());

        let mut rng = SmallRng::seed_from_u64(8);
        renderer.start_with_rng(Some(CountingSurface::default()), 640, 480, ThemeMode::Dark, &mut rng);
        assert_eq!(renderer.field().unwrap().particles().len(), 80);
    }

    #[test]
    fn test_scale_factor_change_rescales_wrap_domain() {
        let mut renderer = running(CountingSurface::default());
        let before = renderer.field().unwrap().particles().to_vec();

        renderer.set_scale_factor(2.0);
        assert_eq!(renderer.field().unwrap().bounds(), glam::Vec2::new(640.0, 360.0));
        assert_eq!(renderer.field().unwrap().particles(), before.as_slice());
        let surface = renderer.surface().unwrap();
        assert_eq!((surface.size, surface.scale_factor), ((1280, 720), 2.0));

        renderer.set_scale_factor(0.0);
        assert_eq!(renderer.scale_factor(), 2.0);
    }
}
