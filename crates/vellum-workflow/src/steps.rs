//! The closed set of step handlers.
//!
//! Dispatch is a match over `StepKind`; adding a step type means a new
//! variant and a new arm here. Every handler receives the run's variable
//! store read-only and returns either a value for the store or a written
//! artifact path.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use vellum_core::config::LlmConfig;
use vellum_core::error::{Result, VellumError};
use vellum_core::traits::{DocumentSource, GenerateClient};
use vellum_core::types::{GenerateRequest, LlmTaskParams, StepDefinition, StepKind};
use vellum_core::vars::{render_template, VariableLookup, VariableStore};

/// Collaborators shared by every handler during one run.
pub(crate) struct StepContext<'a> {
    pub client: &'a Arc<dyn GenerateClient>,
    pub documents: &'a Arc<dyn DocumentSource>,
    pub llm: &'a LlmConfig,
}

/// What a successful step hands back to the executor.
pub(crate) enum StepOutput {
    /// A value to record under the step's output variable.
    Value(serde_json::Value),
    /// A written artifact path (`write_file` only).
    Artifact(PathBuf),
}

pub(crate) async fn run_step(
    step: &StepDefinition,
    vars: &VariableStore,
    ctx: &StepContext<'_>,
) -> Result<StepOutput> {
    match &step.kind {
        StepKind::GatherInputs { value } => Ok(StepOutput::Value(value.clone())),

        StepKind::DownloadDocument { url } => {
            let url = render_template(url, vars)?;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(VellumError::Fetch {
                    url,
                    message: "unsupported URL scheme".to_string(),
                });
            }
            let body = ctx.documents.fetch(&url).await?;
            Ok(StepOutput::Value(serde_json::Value::String(body)))
        }

        StepKind::LlmTask(params) => {
            let text = run_llm_task(params, vars, ctx).await?;
            Ok(StepOutput::Value(serde_json::Value::String(text)))
        }

        StepKind::JsonIterator {
            list_variable,
            action,
        } => {
            let items = load_json_array(list_variable, vars)?;
            let mut outputs = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                debug!(step = %step.name, index, "iterating over element");
                let scoped = vars.scoped("current_item", item);
                let text = run_llm_task(action, &scoped, ctx).await?;
                outputs.push(text);
            }
            Ok(StepOutput::Value(serde_json::Value::String(
                outputs.join("\n\n"),
            )))
        }

        StepKind::WriteFile { variables, path } => {
            let mut content = String::new();
            for variable in variables {
                let value =
                    vars.lookup(variable)
                        .ok_or_else(|| VellumError::Substitution {
                            placeholder: variable.clone(),
                        })?;
                content.push_str(&value_as_text(value));
                content.push_str("\n\n");
            }

            let path = PathBuf::from(render_template(path, vars)?);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(&path, content).await?;
            Ok(StepOutput::Artifact(path))
        }
    }
}

/// Render and send one generative-API call. Shared by `llm_task` and the
/// per-element action of `json_iterator` (which passes a scoped store).
async fn run_llm_task<L: VariableLookup>(
    params: &LlmTaskParams,
    vars: &L,
    ctx: &StepContext<'_>,
) -> Result<String> {
    // Declared prompt variables must all have been produced already
    for variable in &params.prompt_variables {
        if vars.lookup(variable).is_none() {
            return Err(VellumError::Substitution {
                placeholder: variable.clone(),
            });
        }
    }

    let prompt = render_template(&params.prompt, vars)?;
    let config = ctx
        .llm
        .with_overrides(params.endpoint.as_deref(), params.model.as_deref());
    let request = GenerateRequest::text(prompt).with_attachments(params.attachments.clone());

    let response = ctx.client.generate(&config, request).await?;
    Ok(response.text)
}

/// Load a variable as a JSON array, parsing string values as JSON first.
fn load_json_array(
    variable: &str,
    vars: &VariableStore,
) -> Result<Vec<serde_json::Value>> {
    let value = vars
        .lookup(variable)
        .ok_or_else(|| VellumError::Substitution {
            placeholder: variable.to_string(),
        })?;

    let parsed;
    let value = match value {
        serde_json::Value::String(raw) => {
            parsed = serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                VellumError::InvalidVariable {
                    variable: variable.to_string(),
                    message: format!("not valid JSON: {e}"),
                }
            })?;
            &parsed
        }
        other => other,
    };

    match value.as_array() {
        Some(items) => Ok(items.clone()),
        None => Err(VellumError::InvalidVariable {
            variable: variable.to_string(),
            message: "not a JSON array".to_string(),
        }),
    }
}

fn value_as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_json_array_from_string_value() {
        let mut vars = VariableStore::new();
        vars.insert("items", json!(r#"[1, 2, 3]"#)).unwrap();
        let items = load_json_array("items", &vars).unwrap();
        assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_load_json_array_from_array_value() {
        let mut vars = VariableStore::new();
        vars.insert("items", json!(["a", "b"])).unwrap();
        let items = load_json_array("items", &vars).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_load_json_array_rejects_non_array() {
        let mut vars = VariableStore::new();
        vars.insert("items", json!({"not": "an array"})).unwrap();
        assert!(matches!(
            load_json_array("items", &vars),
            Err(VellumError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn test_load_json_array_missing_variable() {
        let vars = VariableStore::new();
        assert!(matches!(
            load_json_array("items", &vars),
            Err(VellumError::Substitution { .. })
        ));
    }
}
