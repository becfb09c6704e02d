use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

use crate::core::config::Config;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String, // "ollama" or "openai"
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_ollama")]
    pub ollama: Option<OllamaConfig>,
    #[serde(default)]
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_request_timeout() -> u64 {
    300
}
fn default_ollama() -> Option<OllamaConfig> {
    Some(OllamaConfig::default())
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "mistral".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            request_timeout_seconds: default_request_timeout(),
            ollama: default_ollama(),
            openai: None,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl LlmConfig {
    /// Overrides the model of the selected provider.
    pub fn set_model(&mut self, model: &str) {
        match self.provider.as_str() {
            "openai" => {
                if let Some(cfg) = self.openai.as_mut() {
                    cfg.model = model.to_string();
                }
            }
            _ => {
                self.ollama.get_or_insert_with(OllamaConfig::default).model = model.to_string();
            }
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    /// Single non-streaming completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub fn create_llm(config: &Config) -> Result<Box<dyn LlmClient>> {
    let timeout = Duration::from_secs(config.llm.request_timeout_seconds);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    match config.llm.provider.as_str() {
        "ollama" => {
            let cfg = config.llm.ollama.as_ref().context("Ollama config missing")?;
            Ok(Box::new(OllamaClient::new(client, &cfg.base_url, &cfg.model)))
        }
        "openai" => {
            let cfg = config.llm.openai.as_ref().context("OpenAI config missing")?;
            Ok(Box::new(OpenAIClient::new(
                client,
                &cfg.api_key,
                &cfg.model,
                cfg.base_url.as_deref(),
            )))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.llm.provider)),
    }
}

// --- Ollama ---
#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    // Absent field reads as an empty completion, which then fails JSON parsing.
    #[serde(default)]
    response: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request_body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error ({}): {}", status, error_text));
        }

        let response_text = resp.text().await?;
        let result: OllamaGenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!("Failed to parse Ollama response: {}. Body: {}", e, response_text)
        })?;
        Ok(result.response)
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(client: reqwest::Client, api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: &self.model,
            messages: vec![OpenAIMessage { role: "user", content: prompt }],
            stream: false,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        if let Some(choice) = result.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                return Ok(content);
            }
        }

        Err(anyhow!("OpenAI response empty or missing content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_request_shape() {
        let body = OllamaGenerateRequest {
            model: "mistral",
            prompt: "Paragraph: ...",
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"model": "mistral", "prompt": "Paragraph: ...", "stream": false})
        );
    }

    #[test]
    fn test_ollama_response_parsing_success() {
        let json = r#"{
            "model": "mistral",
            "created_at": "2024-05-01T10:00:00Z",
            "response": "skip",
            "done": true
        }"#;

        let result: OllamaGenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.response, "skip");
    }

    #[test]
    fn test_ollama_response_missing_field_is_empty_completion() {
        let json = r#"{"model": "mistral", "done": true}"#;
        let result: OllamaGenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.response, "");

        match crate::services::profile::interpret_response(&result.response) {
            crate::core::state::ProfileOutcome::Failed(record) => {
                assert_eq!(record.kind, crate::core::state::ErrorKind::ParseError);
                assert_eq!(record.raw_response.as_deref(), Some(""));
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_ollama_non_json_body_is_an_error() {
        let result: Result<OllamaGenerateResponse, _> = serde_json::from_str("<html>502</html>");
        assert!(result.is_err());
    }

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"character_id\": \"a\"}"
                },
                "finish_reason": "stop"
            }]
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            result.choices[0].message.content.as_deref(),
            Some("{\"character_id\": \"a\"}")
        );
    }

    #[test]
    fn test_create_llm_rejects_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "gemini".to_string();
        assert!(create_llm(&config).is_err());
    }

    #[test]
    fn test_create_llm_requires_openai_section() {
        let mut config = Config::default();
        config.llm.provider = "openai".to_string();
        assert!(create_llm(&config).is_err());

        config.llm.openai = Some(OpenAIConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        });
        assert!(create_llm(&config).is_ok());
    }

    #[test]
    fn test_set_model_targets_selected_provider() {
        let mut llm = LlmConfig::default();
        llm.set_model("llama3");
        assert_eq!(llm.ollama.as_ref().unwrap().model, "llama3");

        llm.provider = "openai".to_string();
        llm.openai = Some(OpenAIConfig {
            api_key: "k".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
        });
        llm.set_model("gpt-4o-mini");
        assert_eq!(llm.openai.as_ref().unwrap().model, "gpt-4o-mini");
        assert_eq!(llm.ollama.as_ref().unwrap().model, "llama3");
    }
}
