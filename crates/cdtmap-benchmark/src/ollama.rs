use std::time::Duration;

use async_trait::async_trait;
use cdtmap_core::{CdtMapError, OllamaConfig, Result, SamplingOptions};
use serde::{Deserialize, Serialize};

/// The model endpoint: one request in, one complete (non-streamed) response out.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Load the model into memory with a one-token request.
    async fn warmup(&self, model: &str) -> Result<()> {
        tracing::info!("Warming up model: {}", model);
        self.chat(&ChatRequest::warmup(model)).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

impl ChatRequest {
    pub fn new(model: &str, system_prompt: &str, user_prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            stream: false,
            format: None,
            options: None,
        }
    }

    pub fn warmup(model: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            stream: false,
            format: None,
            options: Some(ChatOptions {
                temperature: Some(0.0),
                num_predict: Some(1),
                ..Default::default()
            }),
        }
    }

    pub fn with_options(mut self, sampling: &SamplingOptions) -> Self {
        self.options = Some(ChatOptions::from(sampling));
        self
    }

    pub fn json_format(mut self) -> Self {
        self.format = Some("json".to_string());
        self
    }

    /// Content of the final user message.
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl From<&SamplingOptions> for ChatOptions {
    fn from(s: &SamplingOptions) -> Self {
        Self {
            temperature: Some(s.temperature),
            top_p: Some(s.top_p),
            top_k: Some(s.top_k),
            repeat_penalty: Some(s.repeat_penalty),
            seed: Some(s.seed),
            num_predict: s.num_predict,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub total_duration: Option<u64>,
}

impl ChatResponse {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            message: Some(ResponseMessage {
                role: "assistant".to_string(),
                content: content.into(),
            }),
            eval_count: None,
            total_duration: None,
        }
    }

    /// Assistant text, empty when the endpoint sent no message.
    pub fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    size: u64,
    #[serde(default)]
    details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
struct ModelDetails {
    parameter_size: Option<String>,
    quantization_level: Option<String>,
}

/// A model installed on the Ollama host.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub size_bytes: u64,
    pub parameter_size: Option<String>,
    pub quantization: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CdtMapError::Transport(e.to_string()))?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &OllamaConfig) -> Result<Self> {
        Self::new(&config.host, config.timeout())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn map_send_error(&self, e: reqwest::Error) -> CdtMapError {
        match e.is_timeout() {
            true => CdtMapError::Timeout(self.timeout.as_secs()),
            false => CdtMapError::Transport(e.to_string()),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let url = format!("{}/api/tags", self.host);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CdtMapError::Endpoint { status, body });
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| CdtMapError::Decode(e.to_string()))?;

        let models = tags
            .models
            .into_iter()
            .map(|m| {
                let (parameter_size, quantization) = match m.details {
                    Some(d) => (d.parameter_size, d.quantization_level),
                    None => (None, None),
                };
                ModelSummary {
                    name: m.name,
                    size_bytes: m.size,
                    parameter_size,
                    quantization,
                }
            })
            .collect();

        Ok(models)
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.host);

        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CdtMapError::Endpoint { status, body });
        }

        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;

        serde_json::from_str(&body).map_err(|e| {
            CdtMapError::Decode(format!(
                "{} - Body: {}",
                e,
                body.chars().take(500).collect::<String>()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest::new("llama3:8b", "system text", "user text")
            .with_options(&SamplingOptions::default());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama3:8b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "user text");
        assert_eq!(json["options"]["seed"], 42);
        assert_eq!(json["options"]["top_k"], 40);
        assert!(json["options"].get("num_predict").is_none());
        assert!(json.get("format").is_none());
    }

    #[test]
    fn test_json_format_flag() {
        let request = ChatRequest::new("phi:latest", "s", "u").json_format();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_response_without_message_has_empty_content() {
        let resp: ChatResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(resp.content(), "");

        let resp: ChatResponse = serde_json::from_str(
            r#"{"message": {"role": "assistant", "content": "D7140"}, "eval_count": 12}"#,
        )
        .unwrap();
        assert_eq!(resp.content(), "D7140");
        assert_eq!(resp.eval_count, Some(12));
    }

    #[test]
    fn test_host_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.host(), "http://localhost:11434");
    }
}
