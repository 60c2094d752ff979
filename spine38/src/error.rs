use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of input at offset {offset} (needed {needed} more bytes)")]
    UnexpectedEndOfInput { offset: usize, needed: usize },

    #[error("malformed skeleton data: {reason}")]
    MalformedSkeletonData { reason: String },

    /// Produced by the attachment tag decoder. The binary reader downgrades it to a warning and
    /// drops the attachment.
    #[error("unsupported attachment type tag {tag}")]
    UnsupportedAttachmentType { tag: u8 },

    #[error("attachment loader failed for '{attachment}': {message}")]
    AttachmentLoader { attachment: String, message: String },

    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[cfg(feature = "serde")]
    #[error("invalid mix configuration: {message}")]
    Config { message: String },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSkeletonData {
            reason: reason.into(),
        }
    }
}
