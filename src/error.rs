use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure kinds surfaced by the pipeline. Each maps to its own exit code.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("transfer of {item} failed: {reason}")]
    Transfer { item: String, reason: String },

    #[error("warehouse connection failed: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("warehouse statement failed: {0}")]
    Query(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn fetch(url: impl ToString, reason: impl ToString) -> Self {
        PipelineError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transfer(item: impl ToString, reason: impl ToString) -> Self {
        PipelineError::Transfer {
            item: item.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Fetch { .. } => 3,
            PipelineError::Transfer { .. } => 4,
            PipelineError::Connection(_) => 5,
            PipelineError::Configuration(_) => 6,
            PipelineError::Query(_) => 7,
            PipelineError::Io(_) => 1,
        }
    }
}

/// Exit code for an error chain: the first `PipelineError` found wins, anything else is 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map_or(1, PipelineError::exit_code)
}
