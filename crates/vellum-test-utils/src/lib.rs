//! Scripted mocks for the outbound-call seams, shared by crate tests.
//!
//! `MockGenerateClient` matches incoming prompts against substring rules in
//! registration order, optionally delaying before answering, so tests can
//! script per-unit failures and invert completion order deterministically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use vellum_core::config::LlmConfig;
use vellum_core::error::{Result, VellumError};
use vellum_core::traits::{DocumentSource, GenerateClient};
use vellum_core::types::{GenerateRequest, GenerateResponse};

enum MockOutcome {
    Respond(String),
    Timeout,
    Api { status: u16, message: String },
}

struct Rule {
    needle: String,
    outcome: MockOutcome,
    delay: Option<Duration>,
}

/// A `GenerateClient` with scripted responses and failures.
#[derive(Default)]
pub struct MockGenerateClient {
    rules: Vec<Rule>,
    default_response: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl MockGenerateClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `text` when the prompt contains `needle`.
    pub fn respond_to(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome: MockOutcome::Respond(text.into()),
            delay: None,
        });
        self
    }

    /// Like `respond_to`, but sleep first so completion order can be inverted.
    pub fn respond_after(
        mut self,
        needle: impl Into<String>,
        text: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome: MockOutcome::Respond(text.into()),
            delay: Some(delay),
        });
        self
    }

    /// Fail with `Timeout` when the prompt contains `needle`.
    pub fn timeout_on(mut self, needle: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome: MockOutcome::Timeout,
            delay: None,
        });
        self
    }

    /// Fail with `Api { status, message }` when the prompt contains `needle`.
    pub fn fail_on(
        mut self,
        needle: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            outcome: MockOutcome::Api {
                status,
                message: message.into(),
            },
            delay: None,
        });
        self
    }

    /// Response used when no rule matches.
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.default_response = Some(text.into());
        self
    }

    /// Prompts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenerateClient for MockGenerateClient {
    fn generate(
        &self,
        config: &LlmConfig,
        request: GenerateRequest,
    ) -> BoxFuture<'_, Result<GenerateResponse>> {
        let timeout_secs = config.timeout_secs;

        Box::pin(async move {
            self.calls.lock().unwrap().push(request.prompt.clone());

            // Attachments are read before the call, exactly like the real client
            for path in &request.attachments {
                if tokio::fs::metadata(path).await.is_err() {
                    return Err(VellumError::MissingFile(path.clone()));
                }
            }

            let rule = self
                .rules
                .iter()
                .find(|rule| request.prompt.contains(&rule.needle));

            if let Some(delay) = rule.and_then(|r| r.delay) {
                tokio::time::sleep(delay).await;
            }

            match rule.map(|r| &r.outcome) {
                Some(MockOutcome::Respond(text)) => Ok(GenerateResponse { text: text.clone() }),
                Some(MockOutcome::Timeout) => Err(VellumError::Timeout {
                    seconds: timeout_secs,
                }),
                Some(MockOutcome::Api { status, message }) => Err(VellumError::Api {
                    status: *status,
                    message: message.clone(),
                }),
                None => match &self.default_response {
                    Some(text) => Ok(GenerateResponse { text: text.clone() }),
                    None => Err(VellumError::Api {
                        status: 500,
                        message: format!("no scripted response for prompt: {}", request.prompt),
                    }),
                },
            }
        })
    }
}

/// A `DocumentSource` serving canned pages by URL.
#[derive(Default)]
pub struct MockDocumentSource {
    pages: HashMap<String, String>,
}

impl MockDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }
}

impl DocumentSource for MockDocumentSource {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<String>> {
        let result = match self.pages.get(url) {
            Some(body) => Ok(body.clone()),
            None => Err(VellumError::Fetch {
                url: url.to_string(),
                message: "HTTP 404 Not Found".to_string(),
            }),
        };
        Box::pin(async move { result })
    }
}
