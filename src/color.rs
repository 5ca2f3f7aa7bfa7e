// src/color.rs
use bevy_color::{Alpha, ColorToComponents, LinearRgba, Srgba};

/// An sRGB color as authored, converted to linear space on the way to the GPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(Srgba);

impl Color {
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self(self.0.with_alpha(alpha.clamp(0.0, 1.0)))
    }

    pub fn into_linear_rgba(self) -> [f32; 4] {
        LinearRgba::from(self.0).to_f32_array()
    }

    pub fn into_linear_wgpu_color(self) -> wgpu::Color {
        let linear = LinearRgba::from(self.0);
        wgpu::Color {
            r: linear.red as f64,
            g: linear.green as f64,
            b: linear.blue as f64,
            a: linear.alpha as f64,
        }
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self(Srgba::rgb_u8(r, g, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_and_black_are_unchanged_by_linearization() {
        assert_eq!(Color::from((255, 255, 255)).into_linear_rgba(), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(Color::from((0, 0, 0)).into_linear_rgba(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_alpha_is_clamped_and_kept_linear() {
        let c = Color::from((59, 130, 246)).with_alpha(1.3);
        assert_eq!(c.into_linear_rgba()[3], 1.0);
        let c = Color::from((59, 130, 246)).with_alpha(0.25);
        assert_eq!(c.into_linear_rgba()[3], 0.25);
    }

    #[test]
    fn test_midtones_darken_in_linear_space() {
        let [r, g, b, _] = Color::from((128, 128, 128)).into_linear_rgba();
        assert!(r < 0.25 && g < 0.25 && b < 0.25);
    }
}
