// src/particle.rs
use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;

use crate::config::FieldConfig;

/// Amplitude of the sinusoidal pulse added to a particle's base opacity.
pub const PULSE_AMPLITUDE: f32 = 0.2;

/// A single drifting point of the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub base_opacity: f32,
    pub phase: f32,
    pub phase_speed: f32,
}

impl Particle {
    /// Draws every parameter independently from the ranges in `config`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, bounds: Vec2, config: &FieldConfig) -> Self {
        let [vmin, vmax] = config.speed_range;
        let [rmin, rmax] = config.radius_range;
        let [omin, omax] = config.opacity_range;
        let [smin, smax] = config.phase_speed_range;

        Self {
            position: Vec2::new(
                rng.gen_range(0.0..bounds.x.max(f32::EPSILON)),
                rng.gen_range(0.0..bounds.y.max(f32::EPSILON)),
            ),
            velocity: Vec2::new(rng.gen_range(vmin..vmax), rng.gen_range(vmin..vmax)),
            radius: rng.gen_range(rmin..rmax),
            base_opacity: rng.gen_range(omin..omax),
            phase: rng.gen_range(0.0..TAU),
            phase_speed: rng.gen_range(smin..smax),
        }
    }

    /// Moves the particle one frame forward and wraps it into `bounds`.
    pub fn advance(&mut self, bounds: Vec2, margin: f32) {
        self.position += self.velocity;
        self.phase += self.phase_speed;
        self.position.x = wrap_coordinate(self.position.x, bounds.x, margin);
        self.position.y = wrap_coordinate(self.position.y, bounds.y, margin);
    }

    pub fn display_opacity(&self) -> f32 {
        display_opacity(self.base_opacity, self.phase)
    }
}

/// Wraps a single axis: past `extent + margin` reappears at `-margin`, below
/// `-margin` reappears at `extent + margin`. In-range values are untouched.
pub fn wrap_coordinate(value: f32, extent: f32, margin: f32) -> f32 {
    if value < -margin {
        extent + margin
    } else if value > extent + margin {
        -margin
    } else {
        value
    }
}

/// Pulsing opacity of a particle. Not clamped; callers clamp before drawing.
pub fn display_opacity(base_opacity: f32, phase: f32) -> f32 {
    base_opacity + phase.sin() * PULSE_AMPLITUDE
}
