//! Configuration types.
//!
//! Everything is read from environment variables. Loaders take a lookup
//! function so tests can feed a map instead of touching the process env.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Requests with a threshold at or below this value are auto-approved.
pub const AUTO_APPROVAL_CUTOFF: i64 = 30;

const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
    /// Upper bound on one workflow run. `None` waits forever.
    pub workflow_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            workflow_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".into(),
                message: e.to_string(),
            })?,
            None => defaults.port,
        };

        let cors_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(raw) => split_list(&raw),
            None => defaults.cors_origins,
        };
        // Credentialed CORS cannot use a wildcard origin.
        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ConfigError::InvalidValue {
                key: "CORS_ALLOWED_ORIGINS".into(),
                message: "wildcard '*' is not allowed with credentials; list origins explicitly"
                    .into(),
            });
        }

        let workflow_timeout = match lookup("APPROVAL_WORKFLOW_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "APPROVAL_WORKFLOW_TIMEOUT_SECS".into(),
                        message: e.to_string(),
                    })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => defaults.workflow_timeout,
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            workflow_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let backend = lookup("LLM_BACKEND").unwrap_or_else(|| "azure".to_string());
        match backend.trim().to_ascii_lowercase().as_str() {
            "azure" => {
                let endpoint = require("AZURE_OPENAI_ENDPOINT")?;
                let api_key = require("AZURE_OPENAI_API_KEY")?;
                let deployment = require("AZURE_OPENAI_CHAT_DEPLOYMENT_NAME")?;
                let api_version = lookup("AZURE_OPENAI_API_VERSION")
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
                Ok(Self {
                    backend: LlmBackend::AzureOpenAi {
                        endpoint: endpoint.trim_end_matches('/').to_string(),
                        api_version,
                    },
                    api_key: SecretString::from(api_key),
                    model: deployment,
                })
            }
            "openai" => {
                let api_key = require("OPENAI_API_KEY")?;
                let model =
                    lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                Ok(Self {
                    backend: LlmBackend::OpenAi,
                    api_key: SecretString::from(api_key),
                    model,
                })
            }
            other => Err(ConfigError::InvalidValue {
                key: "LLM_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected azure or openai)"),
            }),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
