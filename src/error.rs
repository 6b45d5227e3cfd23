//! Error taxonomy surfaced by the cache client.

use thiserror::Error;

use crate::cache::{BucketError, CodecError, PaginationError, WideMatchError};
use crate::domain::DomainError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum FerretError {
    /// Rejected before any store I/O.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },
    #[error("connection error: {message}")]
    Connection { message: String },
    #[error("store operation failed: {0}")]
    StoreOperation(#[source] StoreError),
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl FerretError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<StoreError> for FerretError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection { message } => Self::Connection { message },
            other => Self::StoreOperation(other),
        }
    }
}

impl From<DomainError> for FerretError {
    fn from(err: DomainError) -> Self {
        Self::invalid_arguments(err.to_string())
    }
}

impl From<PaginationError> for FerretError {
    fn from(err: PaginationError) -> Self {
        Self::invalid_arguments(err.to_string())
    }
}

impl From<CodecError> for FerretError {
    fn from(err: CodecError) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<WideMatchError> for FerretError {
    fn from(err: WideMatchError) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<BucketError> for FerretError {
    fn from(err: BucketError) -> Self {
        match err {
            BucketError::Codec(codec) => codec.into(),
            missing @ BucketError::MissingId { .. } => Self::serialization(missing.to_string()),
        }
    }
}
