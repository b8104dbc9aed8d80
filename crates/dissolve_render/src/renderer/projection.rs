//! Screen-space orthographic projection.

/// `ortho(0, width, height, 0, 1, -1)`: pixels with a top-left origin to
/// clip space, column-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    matrix: [f32; 16],
}

impl Projection {
    /// Projection for a `width x height` surface. Zero dimensions count as 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn orthographic(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let (left, right) = (0.0_f32, width as f32);
        let (bottom, top) = (height as f32, 0.0_f32);
        let (near, far) = (1.0_f32, -1.0_f32);

        let mut matrix = [0.0; 16];
        matrix[0] = 2.0 / (right - left);
        matrix[5] = 2.0 / (top - bottom);
        matrix[10] = -2.0 / (far - near);
        matrix[12] = -(right + left) / (right - left);
        matrix[13] = -(top + bottom) / (top - bottom);
        matrix[14] = -(far + near) / (far - near);
        matrix[15] = 1.0;

        Self { matrix }
    }

    /// Column-major matrix.
    #[must_use]
    pub const fn matrix(&self) -> &[f32; 16] {
        &self.matrix
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::orthographic(1, 1)
    }
}
