//! Text generation capability and its OpenAI-compatible implementation.
//!
//! Endpoints are derived from the configured base URL:
//! - `POST {endpoint}/v1/chat/completions`: one non-streaming chat completion
//! - `GET  {endpoint}/v1/models`: credential check at start-up
//!
//! HTTP failures are classified into [`GenerationError`] so the retry layer can
//! decide between waiting, giving up on one function, or stopping the run.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::LlmSettings;
use crate::error::AppError;

/// Failure of a single generation request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The service rejected the API key (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Too many requests (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Server-side or network trouble that is worth retrying shortly.
    #[error("service unavailable: {0}")]
    Service(String),

    #[error("unexpected generation failure: {0}")]
    Unknown(String),
}

/// Anything able to answer a prompt given a system role.
pub trait TextGenerator {
    fn generate(&self, system_role: &str, user_content: &str) -> Result<String, GenerationError>;
}

/// The instruction templates the tool sends as system role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationMode {
    /// Detailed docstring following the Google style guide.
    GoogleDocstring,
    /// Detailed docstring following PEP 257.
    Pep257Docstring,
    /// At most ten words summarizing a docstring.
    ShortSummary,
    /// The whole function returned with its docstring added.
    FunctionRewrite,
    /// A comment describing the purpose of a whole file.
    FileSummary,
}

impl AnnotationMode {
    pub fn system_role(&self) -> &'static str {
        match self {
            AnnotationMode::GoogleDocstring => {
                "You must write a detailed python docstring following the Google style python \
                 convention for the function below. Answer with ONLY the documentation text, \
                 starting with \"\"\" and ending with \"\"\". Do not repeat the function and do \
                 not use code fences."
            }
            AnnotationMode::Pep257Docstring => {
                "You must write the detailed python docstring following PEP 257 of the function \
                 below. Answer with ONLY the documentation text, starting with \"\"\" and ending \
                 with \"\"\". Do not repeat the function and do not use code fences."
            }
            AnnotationMode::ShortSummary => {
                "You must summarize in at most 10 words the python docstring below. Answer with \
                 the summary only, on a single line."
            }
            AnnotationMode::FunctionRewrite => {
                "You are able to write docstrings respecting PEP 257 and the Google style \
                 convention by adding them to the python function provided as input. The \
                 response must only contain the function and its docstring, without any other \
                 comment and without code fences. Do not change the code of the function."
            }
            AnnotationMode::FileSummary => {
                "You are an expert in python programming. From the imports, signatures and \
                 function summaries below, you must determine the purpose of this program. \
                 Your result must be a python comment: every line starts with #."
            }
        }
    }
}

/// Removes a leading and a trailing markdown code-fence line, if present.
pub fn strip_code_fences(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.first().is_some_and(|l| l.contains("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.contains("```")) {
        lines.pop();
    }
    lines.join("\n")
}

/// Blocking client for the OpenAI chat completions API.
#[derive(Debug)]
pub struct OpenAiGenerator {
    client: Client,
    model: String,
    temperature: Option<f32>,
    url_chat: String,
    url_models: String,
}

impl OpenAiGenerator {
    /// Builds the HTTP client with the bearer token and timeout from `settings`.
    ///
    /// # Errors
    /// - [`AppError::CredentialError`] when no API key is configured or it is not a valid header
    /// - [`AppError::ConfigError`] when the HTTP client cannot be built
    pub fn new(settings: &LlmSettings) -> Result<Self, AppError> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::CredentialError("no API key configured".to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                AppError::CredentialError(format!("invalid API key header: {}", e))
            })?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        let base = settings.endpoint.trim().trim_end_matches('/');
        info!(
            model = %settings.model,
            endpoint = %base,
            timeout_secs = settings.timeout_secs,
            "OpenAiGenerator initialized"
        );

        Ok(Self {
            client,
            model: settings.model.clone(),
            temperature: settings.temperature,
            url_chat: format!("{}/v1/chat/completions", base),
            url_models: format!("{}/v1/models", base),
        })
    }

    /// Checks the key by listing the available models.
    ///
    /// # Errors
    /// [`AppError::CredentialError`] when the service rejects the key or cannot be reached.
    pub fn verify_credentials(&self) -> Result<(), AppError> {
        let resp = self
            .client
            .get(&self.url_models)
            .send()
            .map_err(|e| AppError::CredentialError(format!("could not reach {}: {}", self.url_models, e)))?;

        let status = resp.status();
        if status.is_success() {
            info!("API key is valid");
            Ok(())
        } else {
            let snippet = make_snippet(&resp.text().unwrap_or_default());
            Err(AppError::CredentialError(format!(
                "HTTP {} from {}: {}",
                status, self.url_models, snippet
            )))
        }
    }
}

impl TextGenerator for OpenAiGenerator {
    fn generate(&self, system_role: &str, user_content: &str) -> Result<String, GenerationError> {
        let started = Instant::now();
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_role,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            temperature: self.temperature,
        };

        debug!(
            model = %self.model,
            prompt_len = user_content.len(),
            "POST {}", self.url_chat
        );

        let resp = self
            .client
            .post(&self.url_chat)
            .json(&body)
            .send()
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let snippet = make_snippet(&resp.text().unwrap_or_default());
            error!(
                %status,
                %snippet,
                model = %self.model,
                latency_ms = started.elapsed().as_millis(),
                "chat completion returned non-success status"
            );
            return Err(classify_status(status, snippet));
        }

        let out: ChatCompletionResponse = resp.json().map_err(|e| {
            GenerationError::Unknown(format!(
                "decode error: {}; expected `choices[0].message.content`",
                e
            ))
        })?;

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| GenerationError::Unknown("empty `choices` in response".to_string()))?;

        debug!(
            model = %self.model,
            latency_ms = started.elapsed().as_millis(),
            "chat completion completed"
        );

        Ok(strip_code_fences(&content))
    }
}

pub fn classify_status(status: StatusCode, snippet: String) -> GenerationError {
    let detail = format!("HTTP {}: {}", status, snippet);
    match status.as_u16() {
        401 | 403 => GenerationError::Authentication(detail),
        429 => GenerationError::RateLimited(detail),
        500..=599 => GenerationError::Service(detail),
        _ => GenerationError::Unknown(detail),
    }
}

fn classify_transport(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        GenerationError::Service(err.to_string())
    } else {
        GenerationError::Unknown(err.to_string())
    }
}

/// Short description of an error response: the API's `error.message` when the
/// body is the usual JSON envelope, else the trimmed body.
fn make_snippet(text: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string));
    match message {
        Some(message) => truncate(&message),
        None => truncate(text),
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 300;
    let text = text.trim();
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_error_classes() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            GenerationError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, String::new()),
            GenerationError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            GenerationError::Service(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, String::new()),
            GenerationError::Unknown(_)
        ));
    }

    #[test]
    fn error_envelope_message_is_extracted() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(make_snippet(body), "Incorrect API key provided");
        assert_eq!(make_snippet("  upstream down \n"), "upstream down");
        assert_eq!(make_snippet(&"x".repeat(400)).chars().count(), 301);
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```python\n\"\"\"Doc.\"\"\"\n```"), "\"\"\"Doc.\"\"\"");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn every_mode_has_its_own_role() {
        let modes = [
            AnnotationMode::GoogleDocstring,
            AnnotationMode::Pep257Docstring,
            AnnotationMode::ShortSummary,
            AnnotationMode::FunctionRewrite,
            AnnotationMode::FileSummary,
        ];
        let mut roles: Vec<&str> = modes.iter().map(|m| m.system_role()).collect();
        roles.sort_unstable();
        roles.dedup();
        assert_eq!(roles.len(), modes.len());
    }

    #[test]
    fn chat_request_serializes_roles() {
        let body = ChatCompletionRequest {
            model: "m",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: None,
        };
        let json = serde_json::to_value(&body).expect("serializable");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn missing_key_is_a_credential_error() {
        let settings = LlmSettings {
            api_key: None,
            ..LlmSettings::default()
        };
        assert!(matches!(
            OpenAiGenerator::new(&settings),
            Err(AppError::CredentialError(_))
        ));
    }
}
