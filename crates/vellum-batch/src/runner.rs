//! Parallel execution of independent prompt units.
//!
//! The contrast with the workflow executor is deliberate: batch units have
//! no inter-unit dependencies, so they fan out across a bounded worker
//! pool, and one unit's failure is recorded in its own slot without
//! cancelling or affecting any sibling. Results always come back aligned
//! to submission order, whatever the completion order.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vellum_core::config::{BatchConfig, LlmConfig};
use vellum_core::error::{Result, VellumError};
use vellum_core::traits::GenerateClient;
use vellum_core::types::GenerateRequest;

/// One independent (prompt, attachments) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUnit {
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// Batch input file: a list of `[[units]]` tables.
#[derive(Debug, Deserialize)]
pub struct BatchInput {
    pub units: Vec<BatchUnit>,
}

impl BatchInput {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| VellumError::ConfigNotFound(path.display().to_string()))?;
        let input: BatchInput =
            toml::from_str(&content).map_err(|e| VellumError::Config(e.to_string()))?;
        if input.units.is_empty() {
            return Err(VellumError::Config("batch input has no units".to_string()));
        }
        Ok(input)
    }
}

/// Per-unit outcome, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The terminal result of a batch run, one slot per submitted unit.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub units: Vec<UnitReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.units.iter().all(|u| u.succeeded())
    }

    /// Human-readable report for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, unit) in self.units.iter().enumerate() {
            out.push_str(&format!("--- unit {} ---\n", index + 1));
            out.push_str(&format!("prompt: {}\n", unit.prompt));
            match (&unit.response, &unit.error) {
                (Some(response), _) => out.push_str(&format!("response: {response}\n")),
                (None, Some(error)) => out.push_str(&format!("error: {error}\n")),
                (None, None) => {}
            }
        }
        let failed = self.units.iter().filter(|u| !u.succeeded()).count();
        out.push_str(&format!(
            "{} units, {} failed\n",
            self.units.len(),
            failed
        ));
        out
    }
}

/// Fans independent units out over a bounded worker pool.
pub struct BatchRunner {
    client: Arc<dyn GenerateClient>,
    llm: LlmConfig,
    max_workers: usize,
}

impl BatchRunner {
    pub fn new(client: Arc<dyn GenerateClient>, llm: LlmConfig, batch: BatchConfig) -> Self {
        Self {
            client,
            llm,
            max_workers: batch.max_workers.max(1),
        }
    }

    /// Execute every unit, at most `max_workers` in flight at once.
    ///
    /// The report has exactly one slot per submitted unit, positionally
    /// aligned, each written exactly once by the worker that owned it.
    pub async fn run(&self, units: Vec<BatchUnit>) -> BatchReport {
        let total = units.len();
        info!(total, max_workers = self.max_workers, "batch starting");

        let units = stream::iter(units.into_iter().enumerate())
            .map(|(index, unit)| {
                let client = Arc::clone(&self.client);
                let llm = self.llm.clone();
                async move {
                    let request = GenerateRequest::text(unit.prompt.clone())
                        .with_attachments(unit.files.clone());
                    match client.generate(&llm, request).await {
                        Ok(response) => {
                            info!(unit = index + 1, total, "unit succeeded");
                            UnitReport {
                                prompt: unit.prompt,
                                response: Some(response.text),
                                error: None,
                            }
                        }
                        Err(e) => {
                            warn!(unit = index + 1, total, error = %e, "unit failed");
                            UnitReport {
                                prompt: unit.prompt,
                                response: None,
                                error: Some(e.to_string()),
                            }
                        }
                    }
                }
            })
            .buffered(self.max_workers)
            .collect()
            .await;

        BatchReport { units }
    }
}
