use std::path::PathBuf;

use serde::Serialize;

use vellum_core::types::StepStatus;

/// Terminal record for one step of a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    /// The step's `type` tag.
    pub kind: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// The terminal result of a workflow run.
///
/// Steps appear in resolved execution order. After a fail-fast halt the
/// failing step carries its error and every later step is `NotAttempted`,
/// so the report always answers "never attempted" vs. "attempted and
/// failed" vs. "succeeded" for each step.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    /// Paths written by `write_file` steps, in execution order.
    pub artifacts: Vec<PathBuf>,
    pub succeeded: bool,
}

impl RunReport {
    /// The step that halted the run, if any.
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    /// Human-readable report for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let marker = match step.status {
                StepStatus::Succeeded => "ok  ",
                StepStatus::Failed => "FAIL",
                StepStatus::NotAttempted => "--  ",
            };
            out.push_str(&format!(
                "[{marker}] {} ({}) {}",
                step.name,
                step.kind,
                step.status.label()
            ));
            if step.status == StepStatus::Succeeded {
                out.push_str(&format!(" in {} ms", step.elapsed_ms));
            }
            if let Some(error) = &step.error {
                out.push_str(&format!(": {error}"));
            }
            out.push('\n');
        }
        for artifact in &self.artifacts {
            out.push_str(&format!("wrote {}\n", artifact.display()));
        }
        out.push_str(if self.succeeded {
            "workflow completed\n"
        } else {
            "workflow halted\n"
        });
        out
    }
}
