use signal_core::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

impl StoreError {
    pub(crate) fn invalid_row(table: &'static str, reason: impl std::fmt::Display) -> Self {
        StoreError::InvalidRow {
            table,
            reason: reason.to_string(),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Sqlx(e) => PipelineError::Database(e.to_string()),
            StoreError::Serialization(e) => PipelineError::Serialization(e),
            StoreError::InvalidRow { table, reason } => {
                PipelineError::InvalidData(format!("invalid row in {table}: {reason}"))
            }
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
