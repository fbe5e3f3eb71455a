use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrdersError {
    #[error("not initialized: run 'orders init'")]
    NotInitialized,

    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown id and foreign id produce the same message.
    #[error("standing order not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("conflicting update on standing order {id}: expected version {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OrdersError {
    /// Short machine-readable tag, used by the CLI's JSON output and the
    /// notification log.
    pub fn kind(&self) -> &'static str {
        match self {
            OrdersError::NotInitialized => "not_initialized",
            OrdersError::Validation(_) => "validation_error",
            OrdersError::NotFound(_) => "not_found",
            OrdersError::PreconditionFailed(_) => "precondition_failed",
            OrdersError::Conflict { .. } => "conflict",
            OrdersError::Store(_) => "store_error",
            OrdersError::Io(_) => "io_error",
            OrdersError::Yaml(_) | OrdersError::Json(_) => "serialization_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrdersError>;
