use chatstream_agent::ModelConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Deserialize)]
pub struct ChatStreamConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for ChatStreamConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Admit requests that present no API key.
    #[serde(default)]
    pub allow_anonymous: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_stream_buffer() -> usize {
    1024
}

impl ChatStreamConfig {
    /// Read and parse `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(s) => Self::parse(&s).map_err(|e| {
                anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        config.model = config.model.with_env_overrides();
        Ok(config)
    }

    pub fn parse(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
