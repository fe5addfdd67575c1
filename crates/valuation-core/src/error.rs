use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type ValuationResult<T> = Result<T, ValuationError>;
