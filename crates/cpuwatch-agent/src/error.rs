use cpuwatch_backend::error::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Missing or invalid configuration. Nothing has been sent to the backend.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl AgentError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Backend(e) if e.is_unauthorized() => 3,
            Self::Backend(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
