use thiserror::Error;

/// Failures surfaced by the record store and the backup codec.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A required field was empty or malformed on create/update.
    #[error("{0}")]
    Validation(String),

    #[error("Application #{0} not found")]
    NotFound(i64),

    /// Malformed or unrecognized backup document.
    #[error("{0}")]
    Parse(String),

    /// The durable slot rejected a write. Logged, never returned from a mutation.
    #[error("failed to persist '{key}': {message}")]
    PersistenceWrite { key: String, message: String },
}

impl TrackerError {
    pub fn invalid_backup() -> Self {
        Self::Parse("Invalid backup file format".to_string())
    }
}
