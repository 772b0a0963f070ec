//! Error types for the JPEG session library.

use thiserror::Error;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Main error type for encoder and decoder sessions.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A caller-supplied argument violates the operation's constraints.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No input or output has been configured.
    #[error("Session has no configured input/output")]
    Unconfigured,

    /// The operation is not allowed while the session is started.
    #[error("Session is busy (started)")]
    SessionBusy,

    /// The operation requires a started session.
    #[error("Session is not started")]
    NotStarted,

    /// Path mode could not open its file.
    #[error("Failed to open file: {0}")]
    OpenFailed(String),

    /// Stream mode could not read the current stream position.
    #[error("Failed to query stream position: {0}")]
    PositionQueryFailed(String),

    /// The byte stream is not a decodable JPEG image.
    #[error("Failed to read JPEG header: {0}")]
    HeaderReadFailed(String),

    /// The requested colour conversion is not supported.
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// Width or height is zero.
    #[error("Zero-size image: {width}x{height}")]
    ZeroSizeImage {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Width or height exceeds the codec maximum.
    #[error("Image too large: {width}x{height} (max {max})")]
    OversizeImage {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Largest dimension the codec accepts.
        max: u32,
    },

    /// A scratch buffer could not grow.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The wrapped codec signaled an unrecoverable error.
    #[error("Codec fault: {0}")]
    CodecFault(String),

    /// I/O error outside of a session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster image load/save error.
    #[error("Image error: {0}")]
    Image(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether this error came from a fatal codec signal.
    pub fn is_codec_fault(&self) -> bool {
        matches!(self, SessionError::CodecFault(_))
    }
}

impl From<image::ImageError> for SessionError {
    fn from(err: image::ImageError) -> Self {
        SessionError::Image(err.to_string())
    }
}

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SessionError {
    fn from(err: toml::ser::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Internal(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for SessionError {
    fn from(err: std::collections::TryReserveError) -> Self {
        SessionError::OutOfMemory(err.to_string())
    }
}
