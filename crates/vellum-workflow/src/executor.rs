//! Sequential workflow execution.
//!
//! One logical thread of control: steps run one at a time in resolved
//! order, because any step's inputs may depend on a prior step's output
//! through the variable store. The only suspension point is the outbound
//! call boundary. Failure policy is fail-fast: a failed step halts the
//! run, since downstream steps cannot proceed without its output.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use vellum_core::config::AppConfig;
use vellum_core::error::Result;
use vellum_core::traits::{DocumentSource, GenerateClient};
use vellum_core::types::{StepStatus, Workflow};
use vellum_core::vars::VariableStore;

use crate::report::{RunReport, StepReport};
use crate::resolver::resolve;
use crate::steps::{run_step, StepContext, StepOutput};

/// Executes one workflow run. Construct one per run.
pub struct WorkflowExecutor {
    client: Arc<dyn GenerateClient>,
    documents: Arc<dyn DocumentSource>,
    config: AppConfig,
}

impl WorkflowExecutor {
    pub fn new(
        client: Arc<dyn GenerateClient>,
        documents: Arc<dyn DocumentSource>,
        config: AppConfig,
    ) -> Self {
        Self {
            client,
            documents,
            config,
        }
    }

    /// Validate, resolve, and execute the workflow.
    ///
    /// Structural errors (invalid definition, missing dependency, cycle)
    /// return `Err` before any step runs. Once execution starts, the
    /// outcome is always a `RunReport`; per-step failures are recorded
    /// there, with every step after the failure marked never-attempted.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        initial: VariableStore,
    ) -> Result<RunReport> {
        workflow.validate()?;
        let order = resolve(workflow)?;

        let ctx = StepContext {
            client: &self.client,
            documents: &self.documents,
            llm: &self.config.llm,
        };

        let mut vars = initial;
        let mut steps = Vec::with_capacity(order.len());
        let mut artifacts = Vec::new();
        let mut halted = false;

        for &index in &order {
            let step = &workflow.steps[index];

            if halted {
                steps.push(StepReport {
                    name: step.name.clone(),
                    kind: step.kind.tag().to_string(),
                    status: StepStatus::NotAttempted,
                    error: None,
                    elapsed_ms: 0,
                });
                continue;
            }

            info!(step = %step.name, kind = step.kind.tag(), "step running");
            let start = Instant::now();

            let outcome = match run_step(step, &vars, &ctx).await {
                Ok(StepOutput::Value(value)) => match &step.output_variable {
                    Some(output) => vars.insert(output.clone(), value).map(|_| None),
                    None => Ok(None),
                },
                Ok(StepOutput::Artifact(path)) => Ok(Some(path)),
                Err(e) => Err(e),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(artifact) => {
                    if let Some(path) = artifact {
                        artifacts.push(path);
                    }
                    info!(step = %step.name, elapsed_ms, "step succeeded");
                    steps.push(StepReport {
                        name: step.name.clone(),
                        kind: step.kind.tag().to_string(),
                        status: StepStatus::Succeeded,
                        error: None,
                        elapsed_ms,
                    });
                }
                Err(e) => {
                    error!(step = %step.name, error = %e, "step failed, halting run");
                    steps.push(StepReport {
                        name: step.name.clone(),
                        kind: step.kind.tag().to_string(),
                        status: StepStatus::Failed,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                    halted = true;
                }
            }
        }

        Ok(RunReport {
            steps,
            artifacts,
            succeeded: !halted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vellum_core::config::{BatchConfig, LlmConfig};
    use vellum_core::error::VellumError;
    use vellum_core::types::{LlmTaskParams, StepDefinition, StepKind};
    use vellum_test_utils::{MockDocumentSource, MockGenerateClient};

    fn test_config() -> AppConfig {
        AppConfig {
            llm: LlmConfig {
                endpoint: "https://example.test/{model}:generateContent".into(),
                model_id: "gemini-2.0-flash".into(),
                api_key: Some("test-key".into()),
                timeout_secs: 5,
                max_output_tokens: 1024,
                temperature: 0.0,
            },
            batch: BatchConfig::default(),
        }
    }

    fn gather(name: &str, value: serde_json::Value, output: &str) -> StepDefinition {
        StepDefinition::new(name, StepKind::GatherInputs { value }).with_output(output)
    }

    fn llm(name: &str, prompt: &str, prompt_vars: &[&str], deps: &[&str], output: &str) -> StepDefinition {
        StepDefinition::new(
            name,
            StepKind::LlmTask(LlmTaskParams {
                prompt: prompt.into(),
                prompt_variables: prompt_vars.iter().map(|v| v.to_string()).collect(),
                endpoint: None,
                model: None,
                attachments: vec![],
            }),
        )
        .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
        .with_output(output)
    }

    fn write(name: &str, variables: &[&str], path: &str, deps: &[&str]) -> StepDefinition {
        StepDefinition::new(
            name,
            StepKind::WriteFile {
                variables: variables.iter().map(|v| v.to_string()).collect(),
                path: path.into(),
            },
        )
        .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
    }

    fn executor(client: Arc<MockGenerateClient>) -> WorkflowExecutor {
        WorkflowExecutor::new(
            client,
            Arc::new(MockDocumentSource::new()),
            test_config(),
        )
    }

    #[tokio::test]
    async fn test_hello_world_chain_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("cv.md");

        let client = Arc::new(
            MockGenerateClient::new().respond_to("hello world", "hello world"),
        );
        let workflow = Workflow::new(vec![
            gather("a", json!("hello"), "x"),
            llm("b", "{{x}} world", &["x"], &["a"], "y"),
            write("c", &["y"], out_path.to_str().unwrap(), &["b"]),
        ]);

        let report = executor(client)
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap();

        assert!(report.succeeded);
        assert_eq!(report.artifacts, vec![out_path.clone()]);
        let written = std::fs::read_to_string(&out_path).unwrap();
        assert!(written.starts_with("hello world"));
    }

    #[tokio::test]
    async fn test_fail_fast_marks_remaining_never_attempted() {
        // A -> B (times out) -> C: A succeeded, B failed, C never attempted
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.md");

        let client = Arc::new(MockGenerateClient::new().timeout_on("summarize"));
        let workflow = Workflow::new(vec![
            gather("a", json!("doc body"), "doc"),
            llm("b", "summarize {{doc}}", &["doc"], &["a"], "summary"),
            write("c", &["summary"], out_path.to_str().unwrap(), &["b"]),
        ]);

        let report = executor(client)
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap();

        assert!(!report.succeeded);
        assert_eq!(report.steps[0].status, StepStatus::Succeeded);
        assert_eq!(report.steps[1].status, StepStatus::Failed);
        assert!(report.steps[1].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.steps[2].status, StepStatus::NotAttempted);
        assert!(report.artifacts.is_empty());
        assert!(!out_path.exists());
    }

    #[tokio::test]
    async fn test_failure_at_step_k_executes_exactly_k_steps() {
        // Five-step chain failing at the third
        let client = Arc::new(
            MockGenerateClient::new()
                .fail_on("step3", 500, "upstream exploded")
                .with_default("fine"),
        );
        let mut steps = vec![gather("s1", json!("seed"), "v1")];
        for i in 2..=5 {
            let dep = format!("s{}", i - 1);
            let prompt = format!("step{i} using {{{{v{}}}}}", i - 1);
            steps.push(llm(
                &format!("s{i}"),
                &prompt,
                &[],
                &[dep.as_str()],
                &format!("v{i}"),
            ));
        }
        let workflow = Workflow::new(steps);

        let report = executor(client.clone())
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap();

        let statuses: Vec<StepStatus> = report.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Succeeded,
                StepStatus::Succeeded,
                StepStatus::Failed,
                StepStatus::NotAttempted,
                StepStatus::NotAttempted,
            ]
        );
        // s1 is a gather; only s2 and s3 reached the API
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_any_execution() {
        let client = Arc::new(MockGenerateClient::new().with_default("fine"));
        let workflow = Workflow::new(vec![
            llm("a", "first", &[], &["b"], "out_a"),
            llm("b", "second", &[], &["a"], "out_b"),
        ]);

        let err = executor(client.clone())
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap_err();

        assert!(matches!(err, VellumError::Cycle { .. }));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_prompt_variable_fails_the_step() {
        let client = Arc::new(MockGenerateClient::new().with_default("fine"));
        let workflow = Workflow::new(vec![llm("a", "use {{ghost}}", &["ghost"], &[], "out")]);

        let report = executor(client.clone())
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap();

        assert!(!report.succeeded);
        assert!(report.steps[0].error.as_deref().unwrap().contains("ghost"));
        // Failed before any call went out
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_json_iterator_aggregates_per_element_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("sections.md");

        let client = Arc::new(
            MockGenerateClient::new()
                .respond_to("Expand: alpha", "Alpha section")
                .respond_to("Expand: beta", "Beta section"),
        );
        let iterator = StepDefinition::new(
            "expand",
            StepKind::JsonIterator {
                list_variable: "sections".into(),
                action: LlmTaskParams {
                    prompt: "Expand: {{current_item}}".into(),
                    prompt_variables: vec!["current_item".into()],
                    endpoint: None,
                    model: None,
                    attachments: vec![],
                },
            },
        )
        .with_dependencies(vec!["list".into()])
        .with_output("expanded");

        let workflow = Workflow::new(vec![
            gather("list", json!(["alpha", "beta"]), "sections"),
            iterator,
            write("save", &["expanded"], out_path.to_str().unwrap(), &["expand"]),
        ]);

        let report = executor(client)
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap();

        assert!(report.succeeded);
        let written = std::fs::read_to_string(&out_path).unwrap();
        assert!(written.starts_with("Alpha section\n\nBeta section"));
    }

    #[tokio::test]
    async fn test_download_document_with_seeded_variable() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("jd.html");

        let documents = Arc::new(
            MockDocumentSource::new()
                .with_page("https://jobs.example.test/42", "<html>senior engineer</html>"),
        );
        let executor = WorkflowExecutor::new(
            Arc::new(MockGenerateClient::new()),
            documents,
            test_config(),
        );

        let download = StepDefinition::new(
            "fetch_jd",
            StepKind::DownloadDocument {
                url: "{{jd_link}}".into(),
            },
        )
        .with_output("jd_html");
        let workflow = Workflow::new(vec![
            download,
            write("save", &["jd_html"], out_path.to_str().unwrap(), &["fetch_jd"]),
        ]);

        let mut initial = VariableStore::new();
        initial
            .insert("jd_link", json!("https://jobs.example.test/42"))
            .unwrap();

        let report = executor.execute(&workflow, initial).await.unwrap();
        assert!(report.succeeded);
        let written = std::fs::read_to_string(&out_path).unwrap();
        assert!(written.contains("senior engineer"));
    }

    #[tokio::test]
    async fn test_download_document_rejects_non_http_url() {
        let executor = WorkflowExecutor::new(
            Arc::new(MockGenerateClient::new()),
            Arc::new(MockDocumentSource::new()),
            test_config(),
        );
        let download = StepDefinition::new(
            "fetch",
            StepKind::DownloadDocument {
                url: "file:///etc/passwd".into(),
            },
        )
        .with_output("body");
        let workflow = Workflow::new(vec![download]);

        let report = executor
            .execute(&workflow, VariableStore::new())
            .await
            .unwrap();
        assert!(!report.succeeded);
        assert!(report.steps[0]
            .error
            .as_deref()
            .unwrap()
            .contains("unsupported URL scheme"));
    }
}
