/// Failure classes surfaced to callers of the services. Route handlers map
/// them onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or unusable credentials, e.g. no stored import token.
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    /// Store, social API, LLM or mail provider failure.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
