//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use synthcore::{GenerationError, GenerationRequest, GenerationResponse, GenerationService};
use synthruntime::GenerationConfig;

pub struct HttpGenerationService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpGenerationService {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout {
                seconds: self.timeout_secs,
            }
        } else {
            GenerationError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        tracing::debug!(model = %request.model, endpoint = %self.endpoint, "Sending generation request");

        let mut builder = self.client.post(&self.endpoint).json(&request_body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_send_error(e)
            } else {
                GenerationError::Decode(e.to_string())
            }
        })?;
        parse_completion(&body)
    }
}

fn request_body(request: &GenerationRequest) -> Value {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.is_empty() {
        messages.push(json!({"role": "system", "content": request.system_prompt}));
    }
    messages.push(json!({"role": "user", "content": request.user_prompt}));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    let params = &request.parameters;
    if let Some(t) = params.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = params.top_p {
        body["top_p"] = json!(p);
    }
    if let Some(m) = params.max_tokens {
        body["max_tokens"] = json!(m);
    }
    if let Some(tools) = &request.tools {
        body["tools"] = Value::Array(tools.clone());
    }
    body
}

fn parse_completion(body: &Value) -> Result<GenerationResponse, GenerationError> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| GenerationError::Decode("response has no choices[0].message".to_string()))?;

    let response = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .filter(|calls| !calls.is_empty())
        .cloned();

    Ok(GenerationResponse { response, tool_calls })
}
