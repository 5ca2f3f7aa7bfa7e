// src/field.rs
//! The particle population and the per-frame simulation step.
//!
//! Connections are derived state: [`find_connections`] is a pure function of the
//! current positions, and [`ParticleField::step`] only caches its output so the
//! scene builder can read it without recomputing.

use glam::Vec2;
use rand::Rng;

use crate::config::FieldConfig;
use crate::particle::Particle;

/// Peak opacity of a connection line between two coincident particles.
pub const CONNECTION_MAX_OPACITY: f32 = 0.3;

/// A line registered between two particles during a frame. `a < b` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection {
    pub a: usize,
    pub b: usize,
    pub distance: f32,
    pub opacity: f32,
}

#[derive(Debug)]
pub struct ParticleField {
    config: FieldConfig,
    bounds: Vec2,
    particles: Vec<Particle>,
    neighbor_counts: Vec<u32>,
    connections: Vec<Connection>,
}

impl ParticleField {
    /// Creates the whole population at once. Its size never changes afterwards.
    /// `bounds` is the wrap domain in logical pixels.
    pub fn new<R: Rng + ?Sized>(config: FieldConfig, bounds: Vec2, rng: &mut R) -> Self {
        let particles = (0..config.particle_count)
            .map(|_| Particle::random(&mut *rng, bounds, &config))
            .collect();
        Self::from_particles(config, bounds, particles)
    }

    pub fn from_particles(config: FieldConfig, bounds: Vec2, particles: Vec<Particle>) -> Self {
        let neighbor_counts = vec![0; particles.len()];
        Self {
            config,
            bounds,
            particles,
            neighbor_counts,
            connections: Vec::new(),
        }
    }

    /// Changes the wrap domain. Particles keep their positions; anything now
    /// outside the domain wraps on its next step.
    pub fn resize(&mut self, bounds: Vec2) {
        self.bounds = bounds;
    }

    /// Advances every particle by one frame, then rebuilds the connection set.
    pub fn step(&mut self) {
        let margin = self.config.wrap_margin;
        for particle in self.particles.iter_mut() {
            particle.advance(self.bounds, margin);
        }

        let positions: Vec<Vec2> = self.particles.iter().map(|p| p.position).collect();
        self.neighbor_counts.iter_mut().for_each(|count| *count = 0);
        self.connections = find_connections(
            &positions,
            self.config.connection_distance,
            self.config.max_neighbors,
            &mut self.neighbor_counts,
        );
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn bounds(&self) -> Vec2 {
        self.bounds
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn neighbor_counts(&self) -> &[u32] {
        &self.neighbor_counts
    }
}

/// Greedy pairwise linking in creation order.
///
/// Pairs `(i, j)` with `i < j` are visited in order; a pair links when it is closer
/// than `threshold` and both ends are still below `max_neighbors`. `neighbor_counts`
/// holds the counts going in and is updated in place, so a particle that reaches the
/// cap is skipped for every later pair of the same frame.
pub fn find_connections(
    positions: &[Vec2],
    threshold: f32,
    max_neighbors: u32,
    neighbor_counts: &mut [u32],
) -> Vec<Connection> {
    debug_assert_eq!(positions.len(), neighbor_counts.len());

    let mut connections = Vec::new();
    for i in 0..positions.len() {
        if neighbor_counts[i] >= max_neighbors {
            continue;
        }
        for j in (i + 1)..positions.len() {
            if neighbor_counts[i] >= max_neighbors {
                break;
            }
            if neighbor_counts[j] >= max_neighbors {
                continue;
            }

            let distance = positions[i].distance(positions[j]);
            if distance < threshold {
                neighbor_counts[i] += 1;
                neighbor_counts[j] += 1;
                connections.push(Connection {
                    a: i,
                    b: j,
                    distance,
                    opacity: connection_opacity(distance, threshold),
                });
            }
        }
    }
    connections
}

pub fn connection_opacity(distance: f32, threshold: f32) -> f32 {
    (1.0 - distance / threshold) * CONNECTION_MAX_OPACITY
}
