use thiserror::Error;

/// Every way a mockup request can fail. Pipeline stages return these
/// unchanged; only the HTTP/CLI boundary turns them into messages.
#[derive(Debug, Error)]
pub enum MockupError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Mask image is missing or unreadable: {0}")]
    MissingMask(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dimension mismatch: base is {base_w}x{base_h}, {what} is {other_w}x{other_h}")]
    DimensionMismatch {
        what: &'static str,
        base_w: u32,
        base_h: u32,
        other_w: u32,
        other_h: u32,
    },

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Missing upload field '{0}'")]
    MissingField(&'static str),

    #[error("Mask service error: {0}")]
    MaskService(String),
}

impl MockupError {
    /// True when the caller sent something we cannot work with, as opposed
    /// to a failure on our side or upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MockupError::Decode(_)
                | MockupError::MissingMask(_)
                | MockupError::InvalidArgument(_)
                | MockupError::MissingField(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MockupError>;
