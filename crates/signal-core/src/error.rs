use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Upstream failure for {item}: {cause}")]
    Upstream { item: String, cause: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn upstream(item: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        PipelineError::Upstream {
            item: item.into(),
            cause: cause.to_string(),
        }
    }

    /// Errors that must abort a run before any write-back.
    ///
    /// Everything else is converted into a skip at the innermost loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::Database(_)
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::Configuration("index missing".into()).is_fatal());
        assert!(PipelineError::Database("locked".into()).is_fatal());
        assert!(!PipelineError::InsufficientData("no vector".into()).is_fatal());
        assert!(!PipelineError::upstream("news:42", "timeout").is_fatal());
    }

    #[test]
    fn test_upstream_message_names_item() {
        let err = PipelineError::upstream("news:42", "503 from embedder");
        assert_eq!(err.to_string(), "Upstream failure for news:42: 503 from embedder");
    }
}
