pub mod fetch;
pub mod gemini;

pub use fetch::HttpFetcher;
pub use gemini::{GeminiClient, DEFAULT_MODELS_URL};
