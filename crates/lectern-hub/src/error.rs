use lectern_store::StoreError;

/// Errors surfaced to command callers. Presence and broadcast failures are
/// never represented here: those degrade in place (logged, zero
/// recipients) so a persistence write that already succeeded stays
/// authoritative.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rate limited")]
    RateLimited,

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for HubError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => HubError::NotFound(what),
            other => HubError::Store(other.to_string()),
        }
    }
}

impl HubError {
    /// Stable code string for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Store(_) => "INTERNAL",
        }
    }
}
