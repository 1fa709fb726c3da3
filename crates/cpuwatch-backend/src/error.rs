use cpuwatch_common::types::ValidationError;

/// Errors that can occur when talking to a metrics backend.
///
/// # Examples
///
/// ```rust
/// use cpuwatch_backend::error::BackendError;
///
/// let err = BackendError::UnsupportedBackend("graphite".to_string());
/// assert!(err.to_string().contains("graphite"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// HTTP-level error: non-2xx status code from the backend API.
    #[error("{backend} API HTTP error: status={status}, body={body}")]
    HttpError {
        backend: String,
        status: u16,
        body: String,
    },

    /// The backend decoded the request but refused it.
    #[error("{backend} API error: code={code}, message={message}")]
    ApiResponseError {
        backend: String,
        code: String,
        message: String,
    },

    /// Request was throttled by the backend.
    #[error("{backend} API rate limited: {message}")]
    RateLimited { backend: String, message: String },

    /// Credentials are missing, invalid or lack permission.
    #[error("{backend} rejected credentials: {message}")]
    Unauthorized { backend: String, message: String },

    /// Request signing failed (invalid key length or malformed endpoint).
    #[error("Signing error: {0}")]
    SigningError(String),

    /// An underlying HTTP transport error from `reqwest`.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Well-formed JSON that does not carry the expected fields.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request was rejected locally before anything was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested backend kind is not available.
    #[error("Unsupported metrics backend: {0}")]
    UnsupportedBackend(String),

    /// Backend configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BackendError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<ValidationError> for BackendError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, BackendError>;
