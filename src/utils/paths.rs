//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.
//! Handles ~/.lexflow/ and its contents.

use std::path::PathBuf;

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the Lexflow directory (~/.lexflow/)
pub fn lexflow_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".lexflow"))
}

/// Get the config file path (~/.lexflow/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(lexflow_dir()?.join("config.json"))
}

/// Get the database file path (~/.lexflow/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(lexflow_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the Lexflow directory, creating if it doesn't exist
pub fn ensure_lexflow_dir() -> AppResult<PathBuf> {
    let path = lexflow_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
