//! # DISSOLVE
//!
//! Dust dissolve effect for UI elements: a captured bitmap breaks apart
//! into GPU particles, left to right, and drifts away.
//!
//! ```text
//! dissolve
//!  ├── render   (dissolve_render)  engine, devices, shaders
//!  └── overlay  (dissolve_overlay) host surface driver, UI queue
//! ```
//!
//! Run the demo with: `cargo run -p dissolve --features demo --bin dissolve_demo`

pub use dissolve_overlay as overlay;
pub use dissolve_render as render;

pub use dissolve_overlay::{DustOverlay, OverlayConfig, OverlayHost, OverlaySurface, UiQueue};
pub use dissolve_render::{Bitmap, DissolveError, DissolveResult, Point};

/// A synthetic "captured card": diagonal gradient in `tint` with a darker
/// border, opaque.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_card(width: u32, height: u32, tint: [u8; 3]) -> Bitmap {
    const BORDER: u32 = 4;
    let mut pixels =
        Vec::with_capacity(width as usize * height as usize * Bitmap::BYTES_PER_PIXEL);
    let span = u64::from(width + height).max(1);
    for y in 0..height {
        for x in 0..width {
            let border = x < BORDER || y < BORDER || x + BORDER >= width || y + BORDER >= height;
            let shade = 128 + (u64::from(x + y) * 127 / span) as u32;
            let shade = if border { shade / 2 } else { shade };
            for channel in tint {
                pixels.push((u32::from(channel) * shade / 255) as u8);
            }
            pixels.push(255);
        }
    }
    Bitmap::from_rgba8(width, height, pixels)
        .unwrap_or_else(|_| Bitmap::solid(width, height, [0, 0, 0, 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_card_dimensions() {
        let card = sample_card(40, 20, [255, 128, 0]);
        assert_eq!(card.width(), 40);
        assert_eq!(card.height(), 20);
        assert_eq!(card.pixels().len(), 40 * 20 * 4);
        assert!(card.pixels().chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_sample_card_border_is_darker() {
        let card = sample_card(40, 20, [200, 200, 200]);
        let corner = card.pixels()[0];
        let inner = card.pixels()[(10 * 40 + 20) * 4];
        assert!(corner < inner);
    }
}
