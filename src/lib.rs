//! Scrumline - the computational core of a Scrum-style project tracker.
//!
//! This library provides the core functionality for the `scl` CLI tool:
//! - Reference and slug allocation (`alloc`)
//! - User-story status rollup from task statuses (`rollup`)
//! - Milestone statistics and burndown series (`stats`)
//!
//! Projects, milestones, user stories, and tasks are persisted in a SQLite
//! store (`storage`); the closed-status sets and the point scale are injected
//! through `config`.

pub mod alloc;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod rollup;
pub mod stats;
pub mod storage;


/// Library-level error type for Scrumline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Not initialized: run `scl system init` first")]
    NotInitialized,

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Allocation exhausted for {scope} after {attempts} attempts")]
    AllocationExhausted { scope: String, attempts: u32 },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Scrumline operations.
pub type Result<T> = std::result::Result<T, Error>;
