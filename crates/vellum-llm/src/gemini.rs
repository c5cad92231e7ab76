use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::multipart;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vellum_core::config::LlmConfig;
use vellum_core::error::{Result, VellumError};
use vellum_core::traits::GenerateClient;
use vellum_core::types::{GenerateRequest, GenerateResponse};

/// Default models index for `vellum models`.
pub const DEFAULT_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini generateContent client.
///
/// One outbound request per `generate` call: no retry, no caching. The API
/// key is carried only in the request URL and never appears in logs or
/// error messages.
pub struct GeminiClient {
    http: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// List available model names from the models index.
    pub async fn list_models(&self, index_url: &str) -> Result<Vec<String>> {
        let url = build_url(index_url, &self.api_key);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| request_error(e, index_url, 30))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(VellumError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let index: GeminiModelIndex = response
            .json()
            .await
            .map_err(|e| VellumError::Api {
                status: status.as_u16(),
                message: format!("model index parse failed: {e}"),
            })?;
        Ok(index.models.into_iter().map(|m| m.name).collect())
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequestBody {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GeminiResponseBody {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiModelIndex {
    #[serde(default)]
    models: Vec<GeminiModelEntry>,
}

#[derive(Deserialize)]
struct GeminiModelEntry {
    name: String,
}

// ── Helpers ──────────────────────────────────────────────────────

/// Append the API key as a query parameter unless the endpoint already
/// carries one, and substitute a `{model}` placeholder when present.
fn build_endpoint(config: &LlmConfig, api_key: &str) -> String {
    let endpoint = config.endpoint.replace("{model}", &config.model_id);
    build_url(&endpoint, api_key)
}

fn build_url(endpoint: &str, api_key: &str) -> String {
    if endpoint.contains("?key=") || endpoint.contains("&key=") {
        return endpoint.to_string();
    }
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}key={}", endpoint, separator, api_key)
}

/// Map a transport error onto the taxonomy without leaking the keyed URL.
fn request_error(e: reqwest::Error, endpoint: &str, timeout_secs: u64) -> VellumError {
    if e.is_timeout() {
        VellumError::Timeout {
            seconds: timeout_secs,
        }
    } else {
        VellumError::Fetch {
            url: endpoint.to_string(),
            message: e.without_url().to_string(),
        }
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &GeminiResponseBody) -> Option<String> {
    let content = body.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Read every attachment in full before the call. An unreadable path fails
/// this call only.
async fn read_attachments(paths: &[std::path::PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| VellumError::MissingFile(path.clone()))?;
        files.push((file_name(path), bytes));
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl GenerateClient for GeminiClient {
    fn generate(
        &self,
        config: &LlmConfig,
        request: GenerateRequest,
    ) -> BoxFuture<'_, Result<GenerateResponse>> {
        let config = config.clone();

        Box::pin(async move {
            let url = build_endpoint(&config, &self.api_key);
            let timeout = Duration::from_secs(config.timeout_secs);

            let body = GeminiRequestBody {
                contents: vec![GeminiContent {
                    parts: vec![GeminiPart {
                        text: Some(request.prompt.clone()),
                    }],
                }],
                generation_config: Some(GenerationConfig {
                    max_output_tokens: config.max_output_tokens,
                    temperature: if config.temperature > 0.0 {
                        Some(config.temperature)
                    } else {
                        None
                    },
                }),
            };

            let builder = if request.attachments.is_empty() {
                self.http
                    .post(&url)
                    .header("content-type", "application/json")
                    .json(&body)
            } else {
                // Attachments are read in full before anything goes on the wire
                let files = read_attachments(&request.attachments).await?;
                let payload = serde_json::to_string(&body)?;
                let mut form = multipart::Form::new().part(
                    "request",
                    multipart::Part::text(payload)
                        .mime_str("application/json")
                        .map_err(|e| VellumError::Config(e.to_string()))?,
                );
                for (name, bytes) in files {
                    form = form.part("files", multipart::Part::bytes(bytes).file_name(name));
                }
                self.http.post(&url).multipart(form)
            };

            debug!(
                model = %config.model_id,
                prompt_bytes = request.prompt.len(),
                attachments = request.attachments.len(),
                "sending generate request"
            );

            let response = builder
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| request_error(e, &config.endpoint, config.timeout_secs))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
                return Err(VellumError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let parsed: GeminiResponseBody =
                response.json().await.map_err(|e| VellumError::Api {
                    status: status.as_u16(),
                    message: format!("response parse failed: {}", e.without_url()),
                })?;

            match extract_text(&parsed) {
                Some(text) => Ok(GenerateResponse { text }),
                None => Err(VellumError::Api {
                    status: status.as_u16(),
                    message: "response contained no generated text".to_string(),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_appends_key() {
        let url = build_url("https://example.test/v1beta/models/g:generateContent", "k1");
        assert_eq!(
            url,
            "https://example.test/v1beta/models/g:generateContent?key=k1"
        );
    }

    #[test]
    fn test_build_url_respects_existing_key() {
        let url = build_url("https://example.test/path?key=already", "k1");
        assert_eq!(url, "https://example.test/path?key=already");
    }

    #[test]
    fn test_build_url_with_existing_query() {
        let url = build_url("https://example.test/path?alt=json", "k1");
        assert_eq!(url, "https://example.test/path?alt=json&key=k1");
    }

    #[test]
    fn test_build_endpoint_substitutes_model() {
        let config = LlmConfig {
            endpoint: "https://example.test/v1beta/models/{model}:generateContent".into(),
            model_id: "gemini-2.0-flash".into(),
            api_key: None,
            timeout_secs: 120,
            max_output_tokens: 8192,
            temperature: 0.0,
        };
        let url = build_endpoint(&config, "k1");
        assert_eq!(
            url,
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent?key=k1"
        );
    }

    #[test]
    fn test_extract_text_concatenates_parts() {
        let body: GeminiResponseBody = serde_json::from_str(
            r#"{
                "candidates": [
                    {"content": {"parts": [{"text": "Hello"}, {"text": " world"}]}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(extract_text(&body).as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        let body: GeminiResponseBody = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(extract_text(&body).is_none());
    }

    #[test]
    fn test_extract_text_missing_content() {
        let body: GeminiResponseBody =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(extract_text(&body).is_none());
    }

    #[test]
    fn test_model_index_parse() {
        let index: GeminiModelIndex = serde_json::from_str(
            r#"{"models": [{"name": "models/gemini-2.0-flash"}, {"name": "models/gemini-2.0-pro"}]}"#,
        )
        .unwrap();
        let names: Vec<String> = index.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["models/gemini-2.0-flash", "models/gemini-2.0-pro"]);
    }

    #[tokio::test]
    async fn test_missing_attachment_fails_before_any_request() {
        let client = GeminiClient::new("k1");
        let config = LlmConfig {
            endpoint: "https://example.invalid/generateContent".into(),
            model_id: "gemini-2.0-flash".into(),
            api_key: None,
            timeout_secs: 1,
            max_output_tokens: 64,
            temperature: 0.0,
        };
        let request = GenerateRequest::text("hi")
            .with_attachments(vec!["/nonexistent/vellum-attachment.txt".into()]);

        let err = client.generate(&config, request).await.unwrap_err();
        match err {
            VellumError::MissingFile(path) => {
                assert!(path.ends_with("vellum-attachment.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
