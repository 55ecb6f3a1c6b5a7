use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use dealforge_core::config::LlmConfig;

#[derive(Clone, Copy, Debug)]
pub struct CompletionOptions {
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self { max_tokens: 2048 }
    }
}

/// Transport-level failures only. A response that arrives but cannot be
/// parsed is the caller's problem, not the client's.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm unavailable: {0}")]
    Unavailable(String),
    #[error("llm request timed out after {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError>;
}

/// OpenRouter chat-completions client. Works against any OpenAI-compatible
/// endpoint; the base URL and model come from configuration.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenRouterClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Unavailable(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": options.max_tokens,
        });

        let mut request = self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Unavailable(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Unavailable(format!("upstream returned {status}")));
        }

        let payload: ChatCompletionResponse =
            response.json().await.map_err(|error| LlmError::Unavailable(error.to_string()))?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Unavailable("empty completion choices".to_string()))?;

        Ok(strip_think_tags(&content))
    }
}

/// Removes reasoning-trace blocks some models emit before their answer.
pub fn strip_think_tags(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        output.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                // Unterminated block: drop everything after the opening tag.
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output.trim().to_string()
}

/// Pulls a JSON object out of a model response, tolerating the usual
/// wrapping: a ```json fence, a bare fence, or prose around the object.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                let candidate = after[..end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| trimmed[start..=end].trim())
}

/// Parses the JSON object embedded in a model response into `T`.
pub fn parse_json_payload<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, String> {
    let object = extract_json_object(text).ok_or("no JSON object found in response")?;
    serde_json::from_str(object).map_err(|error| error.to_string())
}

/// Test double that replays a scripted sequence of completions.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .expect("scripted llm lock")
            .push_back(Ok(response.into()));
    }

    pub fn push_err(&self, error: LlmError) {
        self.responses.lock().expect("scripted llm lock").push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("scripted llm lock").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _prompt: &str,
        _options: CompletionOptions,
    ) -> Result<String, LlmError> {
        self.responses
            .lock()
            .expect("scripted llm lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_json_object, parse_json_payload, strip_think_tags};

    #[test]
    fn think_blocks_are_stripped() {
        let text = "<think>internal monologue</think>The answer is 42.";
        assert_eq!(strip_think_tags(text), "The answer is 42.");
    }

    #[test]
    fn unterminated_think_block_drops_trailing_text() {
        let text = "Answer first. <think>never closed";
        assert_eq!(strip_think_tags(text), "Answer first.");
    }

    #[test]
    fn fenced_json_is_extracted() {
        let text = "Here you go:\n```json\n{\"score\": 0.5}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"score\": 0.5}"));
    }

    #[test]
    fn bare_fence_is_extracted() {
        let text = "```\n{\"score\": 0.5}\n```";
        assert_eq!(extract_json_object(text), Some("{\"score\": 0.5}"));
    }

    #[test]
    fn embedded_object_is_extracted_from_prose() {
        let text = "The result is {\"go\": true} as requested.";
        assert_eq!(extract_json_object(text), Some("{\"go\": true}"));
    }

    #[test]
    fn parse_reports_missing_object() {
        let result: Result<serde_json::Value, String> = parse_json_payload("no json here");
        assert!(result.is_err());
    }
}
