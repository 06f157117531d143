use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Timed out after {waited:?} waiting for lock {key}")]
    LockTimeout { key: String, waited: Duration },
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Missing payload field: {0}")]
    PayloadMissing(String),
    #[error("Failed to read payload: {0}")]
    PayloadReadError(String),
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("TTL {0:?} is out of range for the store")]
    InvalidTtl(Duration),
}

pub type DomainResult<T> = Result<T, DomainError>;
