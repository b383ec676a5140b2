//! Error types for depth_vision.

use thiserror::Error;

/// The main error type for depth_vision operations.
#[derive(Error, Debug)]
pub enum DepthError {
    /// The device reported a clipping range whose near and far planes coincide,
    /// so millimeter thresholds cannot be remapped into intensities.
    #[error("degenerate clipping range: near and far planes are both {0} mm")]
    DegenerateClipping(f32),

    /// A buffer did not have the dimensions the operation expected.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The depth device could not be opened or is not connected.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The point cloud could not be serialised as PLY.
    #[error("PLY export error: {0}")]
    Ply(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is out of range or contradicts another one.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A specialized Result type for depth_vision operations.
pub type Result<T> = std::result::Result<T, DepthError>;
