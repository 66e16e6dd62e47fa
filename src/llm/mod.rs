//! LLM integration.
//!
//! Supports:
//! - **Azure OpenAI**: chat completions against a named deployment (reqwest)
//! - **OpenAI**: direct API access via rig-core, bridged by `RigAdapter`
//!
//! The configured provider is wrapped in an `LlmHandle`, built once at
//! startup and shared read-only by the classifier and the extractor.

pub mod azure;
pub mod provider;
mod rig_adapter;

pub use azure::AzureOpenAiProvider;
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    AzureOpenAi {
        endpoint: String,
        api_version: String,
    },
    OpenAi,
}

/// Configuration for creating an LLM provider.
///
/// For Azure, `model` is the deployment name.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match &config.backend {
        LlmBackend::AzureOpenAi {
            endpoint,
            api_version,
        } => {
            let provider = AzureOpenAiProvider::new(
                endpoint.clone(),
                config.model.clone(),
                api_version.clone(),
                config.api_key.clone(),
            )?;
            tracing::info!("Using Azure OpenAI (deployment: {})", config.model);
            Ok(Arc::new(provider))
        }
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

/// Process-wide LLM availability.
///
/// Startup never fails on a bad LLM configuration; it records
/// `Unavailable` instead and every caller checks before each invocation.
#[derive(Clone)]
pub enum LlmHandle {
    Ready(Arc<dyn LlmProvider>),
    Unavailable { reason: String },
}

impl LlmHandle {
    pub fn ready(provider: Arc<dyn LlmProvider>) -> Self {
        Self::Ready(provider)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Build from config, downgrading any failure to `Unavailable`.
    pub fn from_config(config: Result<LlmConfig, crate::error::ConfigError>) -> Self {
        let built = config
            .map_err(crate::error::Error::from)
            .and_then(|c| create_provider(&c).map_err(crate::error::Error::from));
        match built {
            Ok(provider) => Self::Ready(provider),
            Err(e) => {
                tracing::error!(error = %e, "LLM capability unavailable; approval runs will end in Error");
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The provider, or `NotConfigured` when initialization failed.
    pub fn provider(&self) -> Result<&Arc<dyn LlmProvider>, LlmError> {
        match self {
            Self::Ready(provider) => Ok(provider),
            Self::Unavailable { reason } => Err(LlmError::NotConfigured {
                reason: reason.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for LlmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(provider) => f
                .debug_tuple("Ready")
                .field(&provider.model_name())
                .finish(),
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_create_azure_provider() {
        let config = LlmConfig {
            backend: LlmBackend::AzureOpenAi {
                endpoint: "https://contoso.openai.azure.com".to_string(),
                api_version: "2024-06-01".to_string(),
            },
            api_key: secrecy::SecretString::from("az-key"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn handle_from_missing_config_is_unavailable() {
        let handle = LlmHandle::from_config(Err(ConfigError::MissingEnvVar(
            "AZURE_OPENAI_API_KEY".into(),
        )));
        assert!(!handle.is_ready());
        let Err(err) = handle.provider() else {
            panic!("Expected an unavailable provider");
        };
        assert!(matches!(err, LlmError::NotConfigured { ref reason } if reason.contains("AZURE_OPENAI_API_KEY")));
    }
}
