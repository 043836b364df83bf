use crate::TapState;

/// Result alias that carries the custom [`TapError`] type.
pub type Result<T> = std::result::Result<T, TapError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TapError {
    /// Free-form error used by callers (the CLI mostly) that only need a
    /// readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Settings or event payloads that failed to (de)serialise.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// The forward transform rejected its buffers.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
    /// Block lengths must be a power of two and at least two samples.
    #[error("block length {0} is not a power of two >= 2")]
    InvalidBlockLength(usize),
    #[error("invalid band table: {0}")]
    InvalidBandTable(String),
    #[error("invalid stream format: {0}")]
    InvalidStreamFormat(String),
    /// The transform execution context could not be created. Fatal for the
    /// tap instance that attempted it.
    #[error("failed to create transform context: {0}")]
    TransformContext(String),
    /// A lifecycle call arrived in a state that does not allow it.
    #[error("`{operation}` is not allowed while the tap is {from:?}")]
    InvalidTransition {
        from: TapState,
        operation: &'static str,
    },
}

impl TapError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TapError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TapError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
