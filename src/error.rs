//! Error types for ticketflow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("malformed escalation policy: {0}")]
    MalformedPolicy(String),

    #[error("malformed rule condition: {0}")]
    MalformedCondition(String),

    #[error("malformed rule action: {0}")]
    MalformedAction(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Another writer saved the entity since it was loaded.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
