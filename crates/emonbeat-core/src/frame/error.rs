use thiserror::Error;

/// Errors returned by frame tokenizing and decoding.
///
/// # Examples
/// ```
/// use emonbeat_core::frame::error::FrameError;
///
/// let err = FrameError::InvalidToken { index: 2, token: "abc".to_string() };
/// assert!(err.to_string().contains("invalid token at position 2"));
/// ```
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid token at position {index}: {token:?} is not a byte value (0-255)")]
    InvalidToken { index: usize, token: String },
    #[error("frame too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
}
