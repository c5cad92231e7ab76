use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

// ── Step definitions ─────────────────────────────────────────────

/// Parameters for one generative-API call.
///
/// Used directly by `llm_task` steps and nested inside `json_iterator`
/// actions. `endpoint`/`model` override the global defaults when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTaskParams {
    /// Prompt template with `{{variable}}` placeholders.
    pub prompt: String,
    /// Variables that must be present in the store before rendering.
    #[serde(default)]
    pub prompt_variables: Vec<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// File paths attached to the call as multipart parts.
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

/// The closed set of step behaviors, tagged by `type` in the workflow file.
///
/// Adding a new step type is a closed-set extension: a new variant here and
/// a new arm in the executor's dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Materialize a fixed value with no external call. Always succeeds.
    GatherInputs { value: serde_json::Value },
    /// Fetch a document over HTTP. The URL may contain placeholders.
    DownloadDocument { url: String },
    /// Render a prompt and call the generative API.
    LlmTask(LlmTaskParams),
    /// Run an `llm_task` action once per element of a JSON array variable,
    /// joining the per-element outputs.
    JsonIterator {
        list_variable: String,
        action: LlmTaskParams,
    },
    /// Serialize variables to a file. The only kind without an output variable.
    WriteFile {
        variables: Vec<String>,
        path: String,
    },
}

impl StepKind {
    /// The `type` tag as written in workflow files, for logs and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            StepKind::GatherInputs { .. } => "gather_inputs",
            StepKind::DownloadDocument { .. } => "download_document",
            StepKind::LlmTask(_) => "llm_task",
            StepKind::JsonIterator { .. } => "json_iterator",
            StepKind::WriteFile { .. } => "write_file",
        }
    }
}

/// One declared unit of work in a workflow. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique name within the workflow.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Names of steps that must execute before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Variable name under which this step's result is stored.
    #[serde(default)]
    pub output_variable: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl StepDefinition {
    /// Create a step with minimal configuration.
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            dependencies: vec![],
            output_variable: None,
            kind,
        }
    }

    /// Set the dependencies.
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Set the output variable.
    pub fn with_output(mut self, variable: impl Into<String>) -> Self {
        self.output_variable = Some(variable.into());
        self
    }
}

/// An ordered declaration list of steps forming a dependency DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub steps: Vec<StepDefinition>,
}

impl Workflow {
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        Self { steps }
    }

    /// Structural validation: unique names, unique output variables, and the
    /// output-variable rule per step kind. Dependency resolution (missing
    /// names, cycles) is the resolver's concern.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(VellumError::Config("workflow has no steps".to_string()));
        }

        let mut names = BTreeSet::new();
        let mut outputs = BTreeSet::new();

        for step in &self.steps {
            if step.name.is_empty() {
                return Err(VellumError::Config("step with empty name".to_string()));
            }
            if !names.insert(step.name.as_str()) {
                return Err(VellumError::Config(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }

            match (&step.kind, &step.output_variable) {
                (StepKind::WriteFile { .. }, Some(_)) => {
                    return Err(VellumError::Config(format!(
                        "write_file step '{}' must not declare an output variable",
                        step.name
                    )));
                }
                (StepKind::WriteFile { .. }, None) => {}
                (_, None) => {
                    return Err(VellumError::Config(format!(
                        "step '{}' ({}) requires an output variable",
                        step.name,
                        step.kind.tag()
                    )));
                }
                (_, Some(output)) => {
                    if !outputs.insert(output.as_str()) {
                        return Err(VellumError::Config(format!(
                            "duplicate output variable '{}' in step '{}'",
                            output, step.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Load a workflow from a TOML file and validate its structure.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| VellumError::ConfigNotFound(path.display().to_string()))?;
        let workflow: Workflow =
            toml::from_str(&content).map_err(|e| VellumError::Config(e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }
}

// ── Call types ───────────────────────────────────────────────────

/// A rendered request to the generative API.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub attachments: Vec<PathBuf>,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            attachments: vec![],
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<PathBuf>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// A successful generative-API response.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
}

// ── Outcomes ─────────────────────────────────────────────────────

/// Terminal status of a step, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Skipped because an earlier step failed (fail-fast halt).
    NotAttempted,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::NotAttempted => "never attempted",
        }
    }
}
