use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("STORAGE_READ: {0}")]
    StorageRead(String),
    #[error("STORAGE_WRITE: {0}")]
    StorageWrite(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("ALREADY_EXISTS: {0}")]
    AlreadyExists(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
