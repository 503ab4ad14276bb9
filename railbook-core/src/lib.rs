pub mod booking;
pub mod identity;
pub mod payment;
pub mod repository;

/// Error taxonomy shared by the booking, lock, and payment services.
///
/// `Validation` and `Conflict` propagate to the caller with enough detail to
/// act; `Integrity` covers untrusted input (forged gateway callbacks) and is
/// logged without side effects; `Infra` wraps collaborator failures.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Integrity check failed: {0}")]
    Integrity(String),
    #[error("Internal service error: {0}")]
    Infra(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
