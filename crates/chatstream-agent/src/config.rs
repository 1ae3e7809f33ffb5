use serde::{Deserialize, Serialize};

/// Environment variable that overrides [`ModelConfig::base_url`].
pub const BASE_URL_ENV: &str = "OLLAMA_BASE_URL";

/// Settings for the model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama server root, without the `/api/chat` path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name passed to Ollama.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Number of history messages kept when building a prompt.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Replaces the built-in system prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model_id() -> String {
    "mistral".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_history() -> usize {
    10
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_id: default_model_id(),
            temperature: default_temperature(),
            max_history: default_max_history(),
            system_prompt: None,
        }
    }
}

impl ModelConfig {
    /// Apply `OLLAMA_BASE_URL` if it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        self
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}
