//! Tray icon image
//!
//! The icon is drawn in code so the tray works without any asset on disk:
//! a filled disc in the accent color on a transparent square.

/// Edge length of the generated icon in pixels
pub const ICON_SIZE: u32 = 32;

/// Accent color (RGB) used for the disc
pub const ACCENT: (u8, u8, u8) = (255, 153, 0);

/// RGBA pixels for a `size` x `size` disc icon
pub fn app_icon_rgba(size: u32) -> Vec<u8> {
    let (r, g, b) = ACCENT;
    let center = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 / 2.0 - 1.0;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let inside = (dx * dx + dy * dy).sqrt() <= radius;
            let alpha = if inside { 255 } else { 0 };
            pixels.extend_from_slice(&[r, g, b, alpha]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_dimensions() {
        let pixels = app_icon_rgba(ICON_SIZE);
        assert_eq!(pixels.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
    }

    #[test]
    fn test_icon_center_opaque_corner_clear() {
        let size = 16;
        let pixels = app_icon_rgba(size);
        let alpha_at = |x: u32, y: u32| pixels[((y * size + x) * 4 + 3) as usize];

        assert_eq!(alpha_at(8, 8), 255);
        assert_eq!(alpha_at(0, 0), 0);
        assert_eq!(alpha_at(size - 1, size - 1), 0);
    }
}
