use thiserror::Error;

/// Errors surfaced by [`SQLStore`](crate::SQLStore) implementations.
#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    /// A multi-statement batch (schema init) failed part-way. SQLite
    /// runs batches without a wrapping transaction, so earlier
    /// statements may have taken effect.
    #[error("batch error: {0}")]
    Batch(String),

    #[error("connection error: {0}")]
    Connection(String),
}
