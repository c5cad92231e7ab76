pub mod config;
pub mod error;
pub mod traits;
pub mod types;
pub mod vars;

pub use config::{AppConfig, BatchConfig, LlmConfig};
pub use error::{Result, VellumError};
pub use types::*;
pub use vars::{render_template, ScopedStore, VariableLookup, VariableStore};
