//! Captured source content and screen-space geometry.
//!
//! Coordinates are integer pixels with a top-left origin, matching the
//! projection the renderer builds on resize.

use crate::error::{DissolveError, DissolveResult};

/// Integer screen position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// Horizontal position, growing right.
    pub x: i32,
    /// Vertical position, growing down.
    pub y: i32,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Integer screen rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Rectangle of `width x height` anchored at `origin`.
    #[must_use]
    pub const fn from_origin(origin: Point, width: u32, height: u32) -> Self {
        Self {
            left: origin.x,
            top: origin.y,
            width,
            height,
        }
    }

    /// Right edge (exclusive).
    #[must_use]
    pub fn right(&self) -> i64 {
        i64::from(self.left) + i64::from(self.width)
    }

    /// Bottom edge (exclusive).
    #[must_use]
    pub fn bottom(&self) -> i64 {
        i64::from(self.top) + i64::from(self.height)
    }
}

/// RGBA8 pixel snapshot of the element being dissolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Bytes per RGBA8 pixel.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wraps a tightly packed RGBA8 buffer, rejecting length mismatches.
    ///
    /// # Errors
    ///
    /// [`DissolveError::InvalidBitmap`] when `pixels.len() != width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> DissolveResult<Self> {
        let expected = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(Self::BYTES_PER_PIXEL);
        if pixels.len() != expected {
            return Err(DissolveError::InvalidBitmap {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Bitmap filled with one color.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: rgba.repeat(count),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 rows, top row first.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes per row.
    #[must_use]
    pub const fn row_pitch(&self) -> u32 {
        self.width * 4
    }

    /// True when either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
