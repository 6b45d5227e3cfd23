use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid document id `{value}`: {reason}")]
    InvalidId { value: String, reason: String },
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

impl DomainError {
    pub fn invalid_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}
