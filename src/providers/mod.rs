//! Speech-to-text back-ends behind a single calling contract.
//!
//! Every back-end implements [`TranscriptionProvider`]; the orchestrator only
//! ever talks to the trait. [`ProviderId`] is the closed set of back-ends this
//! build knows about, so an unknown provider name is rejected at parse time
//! instead of being silently carried around as a string key.

pub mod deepgram;
pub mod error;
pub mod openai;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppConfig;

pub use deepgram::DeepgramProvider;
pub use error::ProviderError;
pub use openai::OpenAiProvider;

/// Identifier of a transcription back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Deepgram,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::OpenAi, ProviderId::Deepgram];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Deepgram => "deepgram",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "deepgram" => Ok(ProviderId::Deepgram),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

/// Normalized transcript returned by every back-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub processing_time_ms: u64,
}

/// One call's worth of input for a back-end.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Raw bytes of the uploaded audio file, shared between all provider tasks of a job.
    pub audio: Arc<Vec<u8>>,
    /// Original file name; back-ends use its extension to infer the container format.
    pub file_name: String,
    /// ISO-639-1 language hint. `None` lets the back-end detect the language.
    pub language: Option<String>,
    /// Model override for this call. `None` uses the back-end's configured default.
    pub model: Option<String>,
}

/// Capability interface for a transcription back-end.
///
/// Implementations must report every failure through [`ProviderError`];
/// the orchestrator still guards against panics, but treats them as bugs.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, ProviderError>;
}

/// Milliseconds to wait as advertised by a `retry-after` header, defaulting to one second.
pub(crate) fn retry_after_ms(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(1000)
}

/// The set of back-ends available to the orchestrator.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn TranscriptionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration. Back-ends without an API key are skipped.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::new();

        if config.openai.is_configured() {
            registry.register(OpenAiProvider::from_config(&config.openai)?);
        } else {
            debug!("openai provider disabled: no API key");
        }

        if config.deepgram.is_configured() {
            registry.register(DeepgramProvider::from_config(&config.deepgram)?);
        } else {
            debug!("deepgram provider disabled: no API key");
        }

        Ok(registry)
    }

    pub fn register<P: TranscriptionProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.id(), Arc::new(provider));
    }

    #[cfg(test)]
    pub fn with<P: TranscriptionProvider + 'static>(mut self, provider: P) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn TranscriptionProvider>> {
        self.providers.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Scriptable back-end used by tests across the crate.
#[cfg(test)]
pub mod mock {
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone)]
    pub enum Behavior {
        Succeed(String),
        Fail(String),
        Panic(String),
    }

    pub struct MockProvider {
        pub id: ProviderId,
        pub delay: Duration,
        pub behavior: Behavior,
    }

    impl MockProvider {
        pub fn ok(id: ProviderId, text: &str, delay: Duration) -> Self {
            Self {
                id,
                delay,
                behavior: Behavior::Succeed(text.to_string()),
            }
        }

        pub fn failing(id: ProviderId, message: &str, delay: Duration) -> Self {
            Self {
                id,
                delay,
                behavior: Behavior::Fail(message.to_string()),
            }
        }

        pub fn panicking(id: ProviderId, message: &str, delay: Duration) -> Self {
            Self {
                id,
                delay,
                behavior: Behavior::Panic(message.to_string()),
            }
        }
    }

    #[async_trait]
    impl TranscriptionProvider for MockProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn transcribe(
            &self,
            request: &TranscriptionRequest,
        ) -> Result<Transcript, ProviderError> {
            tokio::time::sleep(self.delay).await;
            match &self.behavior {
                Behavior::Succeed(text) => Ok(Transcript {
                    text: text.clone(),
                    confidence: Some(0.9),
                    detected_language: request.language.clone(),
                    duration_seconds: None,
                    model: request.model.clone(),
                    processing_time_ms: self.delay.as_millis() as u64,
                }),
                Behavior::Fail(message) => Err(ProviderError::Rejected(message.clone())),
                Behavior::Panic(message) => panic!("{message}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::mock::MockProvider;
    use super::*;

    #[test]
    fn provider_id_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderId>().unwrap(), ProviderId::OpenAi);
        assert_eq!(" deepgram ".parse::<ProviderId>().unwrap(), ProviderId::Deepgram);
    }

    #[test]
    fn provider_id_rejects_unknown_names() {
        let err = "assemblyai".parse::<ProviderId>().unwrap_err();
        assert_eq!(err.to_string(), "unknown provider: assemblyai");
    }

    #[test]
    fn provider_id_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ProviderId::OpenAi).unwrap(), r#""openai""#);
        assert_eq!(ProviderId::Deepgram.to_string(), "deepgram");
    }

    #[test]
    fn registry_skips_unconfigured_providers() {
        let mut config = AppConfig::default();
        config.deepgram.api_key = "dg-key".into();

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.ids(), vec![ProviderId::Deepgram]);
        assert!(registry.get(ProviderId::OpenAi).is_none());
    }

    #[test]
    fn registry_replaces_provider_with_same_id() {
        let registry = ProviderRegistry::new()
            .with(MockProvider::ok(ProviderId::OpenAi, "first", Duration::ZERO))
            .with(MockProvider::ok(ProviderId::OpenAi, "second", Duration::ZERO));
        assert_eq!(registry.ids(), vec![ProviderId::OpenAi]);
    }
}
