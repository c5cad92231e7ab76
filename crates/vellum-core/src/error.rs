use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VellumError {
    // Workflow definition errors, fatal before any step executes
    #[error("dependency cycle among steps: {}", .remaining.join(", "))]
    Cycle { remaining: Vec<String> },

    #[error("step '{step}' depends on undeclared step '{dependency}'")]
    MissingDependency { step: String, dependency: String },

    // Per-step / per-unit runtime errors
    #[error("no variable produced for placeholder '{placeholder}'")]
    Substitution { placeholder: String },

    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("attachment not readable: {0}")]
    MissingFile(PathBuf),

    #[error("variable '{variable}' unusable: {message}")]
    InvalidVariable { variable: String, message: String },

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VellumError {
    /// Whether this error invalidates the workflow definition itself,
    /// as opposed to failing a single step or batch unit.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VellumError::Cycle { .. }
                | VellumError::MissingDependency { .. }
                | VellumError::Config(_)
                | VellumError::ConfigNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VellumError>;
