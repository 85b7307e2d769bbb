use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource not found")]
    NotFound,

    #[error("operation not permitted")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("corrupt stored value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt identifier: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("corrupt timestamp: {0}")]
    Time(#[from] chrono::ParseError),

    #[error("routing failed: {0}")]
    Routing(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
