use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Screenshot storage error: {0}")]
    Storage(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid trade record: {0}")]
    InvalidRecord(#[from] crate::models::RecordError),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl JournalError {
    pub fn trade_not_found(id: &str) -> Self {
        JournalError::NotFound {
            entity: "Trade",
            id: id.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for JournalError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        JournalError::Lock(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
