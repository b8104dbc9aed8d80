//! # Dissolve Error Types
//!
//! Every failure the engine can report. There is no recovery path:
//! whichever variant surfaces, the renderer that produced it is done.

use std::fmt;

use thiserror::Error;

/// Shader stage a compile error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage of a render program.
    Vertex,
    /// Fragment stage of a render program.
    Fragment,
    /// Compute stage of the spawn program.
    Compute,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        })
    }
}

/// Errors that can occur in the dissolve engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DissolveError {
    /// The device cannot run the engine (no compute shaders, API too old).
    #[error("unsupported platform: {reason}")]
    UnsupportedPlatform {
        /// What the device is missing.
        reason: String,
    },

    /// A shader stage failed to compile.
    #[error("{stage} shader compilation error: {log}")]
    ShaderCompile {
        /// The failing stage.
        stage: ShaderStage,
        /// Compiler log.
        log: String,
    },

    /// Compiled stages failed to link into a program.
    #[error("{program} program linking error: {log}")]
    ProgramLink {
        /// Program label.
        program: &'static str,
        /// Linker log.
        log: String,
    },

    /// A device operation failed unexpectedly.
    #[error("GPU call `{operation}` failed: {detail}")]
    GpuCall {
        /// Device operation name.
        operation: &'static str,
        /// Backend-provided detail.
        detail: String,
    },

    /// Pixel buffer length does not match the bitmap dimensions.
    #[error("invalid bitmap: {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidBitmap {
        /// Bitmap width in pixels.
        width: u32,
        /// Bitmap height in pixels.
        height: u32,
        /// Expected byte length (`width * height * 4`).
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// Configuration could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DissolveError {
    /// Shorthand for [`DissolveError::GpuCall`].
    #[must_use]
    pub fn gpu_call(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::GpuCall {
            operation,
            detail: detail.into(),
        }
    }

    /// Shorthand for [`DissolveError::UnsupportedPlatform`].
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            reason: reason.into(),
        }
    }
}

/// Result type for dissolve operations.
pub type DissolveResult<T> = Result<T, DissolveError>;
