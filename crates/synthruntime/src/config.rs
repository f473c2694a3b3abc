use serde::{Deserialize, Serialize};
use std::path::Path;
use synthcore::{GenerationParameters, SynthError};

/// Top-level configuration file layout.
///
/// ```toml
/// [runtime]
/// strict_connections = true
///
/// [generation]
/// base_url = "http://localhost:8000/v1"
/// timeout_secs = 60
///
/// [server]
/// bind_address = "0.0.0.0:3000"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the bounded progress queue in streaming mode
    pub event_buffer_size: usize,
    /// How long the stream consumer waits for an event before checking
    /// whether the producer has finished
    pub poll_interval_ms: u64,
    /// Reject connections that reference undeclared nodes
    pub strict_connections: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 256,
            poll_interval_ms: 100,
            strict_connections: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Parameters applied under every node's own `model_parameters`
    pub defaults: GenerationParameters,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
            defaults: GenerationParameters {
                temperature: Some(0.7),
                top_p: Some(0.9),
                max_tokens: Some(1000),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SynthError> {
        let mut config = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)?;
                Self::from_toml(&data)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(data: &str) -> Result<Self, SynthError> {
        toml::from_str(data).map_err(|e| SynthError::Config(e.to_string()))
    }

    /// Override fields from `SYNTH_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), SynthError> {
        if let Some(url) = var("SYNTH_GENERATION_URL") {
            self.generation.base_url = url;
        }
        if let Some(key) = var("SYNTH_GENERATION_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(timeout) = var("SYNTH_GENERATION_TIMEOUT") {
            self.generation.timeout_secs = timeout
                .parse()
                .map_err(|_| SynthError::Config(format!("SYNTH_GENERATION_TIMEOUT is not a number: {}", timeout)))?;
        }
        if let Some(addr) = var("SYNTH_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        Ok(())
    }
}
