// src/scene.rs
//! Turns the simulated field into draw lists for one frame.

use crate::field::ParticleField;
use crate::models::{CircleInstance, LineVertex};
use crate::theme::Palette;

pub const GLOW_RADIUS_SCALE: f32 = 1.2;
pub const GLOW_OPACITY_SCALE: f32 = 0.8;

/// Everything drawn in one frame, in paint order: circles first, lines on top.
#[derive(Debug, Default, Clone)]
pub struct FrameGeometry {
    /// Two entries per particle: the glow, then the core.
    pub circles: Vec<CircleInstance>,
    /// Two vertices per connection.
    pub lines: Vec<LineVertex>,
}

impl FrameGeometry {
    pub fn build(field: &ParticleField, palette: &Palette) -> Self {
        let mut geometry = Self::default();
        geometry.rebuild(field, palette);
        geometry
    }

    /// Refills the draw lists in place, reusing their allocations.
    pub fn rebuild(&mut self, field: &ParticleField, palette: &Palette) {
        self.circles.clear();
        self.lines.clear();

        for particle in field.particles() {
            // Pulsing can push the opacity outside [0, 1].
            let opacity = particle.display_opacity().clamp(0.0, 1.0);
            let center = particle.position.to_array();

            self.circles.push(CircleInstance {
                center,
                radius: particle.radius * GLOW_RADIUS_SCALE,
                color: palette.particle.with_alpha(opacity * GLOW_OPACITY_SCALE).into_linear_rgba(),
            });
            self.circles.push(CircleInstance {
                center,
                radius: particle.radius,
                color: palette.particle.with_alpha(opacity).into_linear_rgba(),
            });
        }

        let particles = field.particles();
        for connection in field.connections() {
            let color = palette.connection.with_alpha(connection.opacity).into_linear_rgba();
            self.lines.push(LineVertex {
                position: particles[connection.a].position.to_array(),
                color,
            });
            self.lines.push(LineVertex {
                position: particles[connection.b].position.to_array(),
                color,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::particle::Particle;
    use crate::theme::ThemeMode;
    use glam::Vec2;
    use std::f32::consts::FRAC_PI_2;

    fn particle(x: f32, y: f32, base_opacity: f32, phase: f32) -> Particle {
        Particle {
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
            radius: 2.0,
            base_opacity,
            phase,
            phase_speed: 0.0,
        }
    }

    #[test]
    fn test_each_particle_gets_glow_then_core() {
        let field = ParticleField::from_particles(
            FieldConfig::default(),
            Vec2::new(800.0, 600.0),
            vec![particle(10.0, 20.0, 0.5, 0.0)],
        );
        let geometry = FrameGeometry::build(&field, &ThemeMode::Dark.palette());

        assert_eq!(geometry.circles.len(), 2);
        let (glow, core) = (geometry.circles[0], geometry.circles[1]);
        assert_eq!(glow.center, [10.0, 20.0]);
        assert!((glow.radius - 2.4).abs() < 1e-6);
        assert_eq!(core.radius, 2.0);
        assert!((glow.color[3] - 0.4).abs() < 1e-6);
        assert!((core.color[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_opacity_is_clamped_before_drawing() {
        let field = ParticleField::from_particles(
            FieldConfig::default(),
            Vec2::new(800.0, 600.0),
            vec![particle(0.0, 0.0, 1.0, FRAC_PI_2), particle(500.0, 500.0, 0.1, -FRAC_PI_2)],
        );
        let geometry = FrameGeometry::build(&field, &ThemeMode::Light.palette());

        assert_eq!(geometry.circles[1].color[3], 1.0);
        assert!((geometry.circles[0].color[3] - 0.8).abs() < 1e-6);
        assert_eq!(geometry.circles[3].color[3], 0.0);
    }

    #[test]
    fn test_connections_become_line_pairs() {
        let mut field = ParticleField::from_particles(
            FieldConfig::default(),
            Vec2::new(800.0, 600.0),
            vec![particle(100.0, 100.0, 0.5, 0.0), particle(160.0, 100.0, 0.5, 0.0)],
        );
        field.step();
        let geometry = FrameGeometry::build(&field, &ThemeMode::Dark.palette());

        assert_eq!(geometry.lines.len(), 2);
        assert_eq!(geometry.lines[0].position, [100.0, 100.0]);
        assert_eq!(geometry.lines[1].position, [160.0, 100.0]);
        assert!((geometry.lines[0].color[3] - 0.15).abs() < 1e-6);
    }
}
