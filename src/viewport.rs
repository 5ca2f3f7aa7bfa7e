// src/viewport.rs
// Logical-pixel projection shared by both pipelines.
use glam::{Mat4, Vec2};
use bytemuck::{Pod, Zeroable};

// Uniform block sent to the GPU
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ViewportUniform {
    pub view_proj: [[f32; 4]; 4],
    pub needs_srgb_output_conversion: u32, // 0 for false, 1 for true
    pub _padding: [u32; 3], // pads the block to 80 bytes
}

/// Logical (CSS) size of a physical surface. A non-positive or non-finite scale
/// factor counts as 1.
pub fn logical_size(width: u32, height: u32, scale_factor: f64) -> Vec2 {
    let scale = if scale_factor.is_finite() && scale_factor > 0.0 { scale_factor } else { 1.0 };
    Vec2::new((width as f64 / scale) as f32, (height as f64 / scale) as f32)
}

#[derive(Debug)]
pub struct Viewport {
    pub size: Vec2, // physical pixels
    pub scale_factor: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, scale_factor: f64) -> Self {
        Self { size: Vec2::new(width as f32, height as f32), scale_factor }
    }

    /// Ignores zero sizes so the projection never degenerates.
    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f64) {
        if width > 0 && height > 0 {
            self.size = Vec2::new(width as f32, height as f32);
            self.scale_factor = scale_factor;
        }
    }

    pub fn logical_size(&self) -> Vec2 {
        logical_size(self.size.x as u32, self.size.y as u32, self.scale_factor)
    }

    /// Maps logical pixels (origin top-left, y down) onto clip space, so the
    /// physical surface is covered at any scale factor.
    pub fn build_view_projection_matrix(&self) -> Mat4 {
        let logical = self.logical_size().max(Vec2::ONE);
        Mat4::orthographic_rh(0.0, logical.x, logical.y, 0.0, -1.0, 1.0)
    }

    pub fn uniform(&self, needs_srgb_output_conversion: bool) -> ViewportUniform {
        ViewportUniform {
            view_proj: self.build_view_projection_matrix().to_cols_array_2d(),
            needs_srgb_output_conversion: needs_srgb_output_conversion as u32,
            _padding: [0; 3],
        }
    }
}
