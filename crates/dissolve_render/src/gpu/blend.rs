//! Blend state modelling.
//!
//! Dust and sprite share one blend equation, set once at init:
//! ```text
//! color_blend:
//!   src_factor: SRC_ALPHA
//!   dst_factor: ONE_MINUS_SRC_ALPHA
//!   operation: ADD
//!
//! alpha_blend:
//!   src_factor: SRC_ALPHA
//!   dst_factor: ONE_MINUS_SRC_ALPHA
//!   operation: ADD
//!
//! write_mask: ALL
//! ```

use serde::{Deserialize, Serialize};

/// Blend mode for dust and sprite output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Classic alpha blending (SRC_ALPHA + ONE_MINUS_SRC_ALPHA).
    /// Captured UI content is straight alpha, so this is the default.
    #[default]
    AlphaBlend,

    /// Pre-multiplied alpha (ONE + ONE_MINUS_SRC_ALPHA)
    /// for hosts that capture premultiplied bitmaps.
    Premultiplied,

    /// Additive blending (ONE + ONE). Dust glows instead of occluding.
    Additive,
}

impl BlendMode {
    /// Returns the blend equation for this mode.
    #[must_use]
    pub const fn blend_state(&self) -> BlendStateConfig {
        match self {
            Self::AlphaBlend => BlendStateConfig::symmetric(
                BlendFactor::SrcAlpha,
                BlendFactor::OneMinusSrcAlpha,
            ),
            Self::Premultiplied => {
                BlendStateConfig::symmetric(BlendFactor::One, BlendFactor::OneMinusSrcAlpha)
            }
            Self::Additive => BlendStateConfig::symmetric(BlendFactor::One, BlendFactor::One),
        }
    }
}

/// Blend factor (mirrors WGPU)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0.0
    Zero,
    /// 1.0
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - Source alpha
    OneMinusSrcAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src + dst
    Add,
}

/// Full blend state configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateConfig {
    /// Color source factor
    pub color_src: BlendFactor,
    /// Color destination factor
    pub color_dst: BlendFactor,
    /// Color operation
    pub color_op: BlendOp,
    /// Alpha source factor
    pub alpha_src: BlendFactor,
    /// Alpha destination factor
    pub alpha_dst: BlendFactor,
    /// Alpha operation
    pub alpha_op: BlendOp,
}

impl BlendStateConfig {
    /// Same factors for color and alpha, additive operation.
    #[must_use]
    pub const fn symmetric(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            color_src: src,
            color_dst: dst,
            color_op: BlendOp::Add,
            alpha_src: src,
            alpha_dst: dst,
            alpha_op: BlendOp::Add,
        }
    }
}
