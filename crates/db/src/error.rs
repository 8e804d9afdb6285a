//! Error types for bookshelf-db

use thiserror::Error;

/// Errors raised by the connection manager and the statements it executes.
#[derive(Debug, Error)]
pub enum DbError {
    /// A required connection setting is absent or empty.
    #[error("missing database setting: {0}")]
    MissingSetting(&'static str),

    /// The pool could not be established.
    #[error("failed to connect to database at {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: sqlx::Error,
    },

    /// `shutdown` has been called; no further statements are accepted.
    #[error("database connection manager has been shut down")]
    Closed,

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("failed to decode column '{column}' of type {type_name}: {reason}")]
    Decode {
        column: String,
        type_name: String,
        reason: String,
    },

    /// A statement expected to return a row returned none.
    #[error("statement returned no rows")]
    NoRows,

    /// A decoded record did not match the requested shape.
    #[error("failed to map record: {0}")]
    Mapping(#[from] serde_json::Error),
}

impl DbError {
    /// Whether the failure is about reaching the database rather than the
    /// statement itself.
    pub fn is_connectivity(&self) -> bool {
        match self {
            DbError::MissingSetting(_) | DbError::Connection { .. } | DbError::Closed => true,
            DbError::Query(source) => matches!(
                source,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            ),
            DbError::Decode { .. } | DbError::NoRows | DbError::Mapping(_) => false,
        }
    }
}
