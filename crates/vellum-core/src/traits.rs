use futures::future::BoxFuture;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::types::{GenerateRequest, GenerateResponse};

/// Generative-API client: the single outbound-call seam shared by the
/// workflow executor and the batch runner.
///
/// Implementations perform exactly one network request per call: no retry,
/// no caching. Repeated identical calls re-execute.
pub trait GenerateClient: Send + Sync + 'static {
    /// Send a rendered request and receive the generated text.
    fn generate(
        &self,
        config: &LlmConfig,
        request: GenerateRequest,
    ) -> BoxFuture<'_, Result<GenerateResponse>>;
}

/// Document source that fetches a document body from a URL.
pub trait DocumentSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<String>>;
}
