use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use super::error::ProviderError;
use super::types::{DeepgramErrorBody, DeepgramResponse};
use super::{ProviderId, Transcript, TranscriptionProvider, TranscriptionRequest, retry_after_ms};
use crate::config::ProviderConfig;

const API_URL: &str = "https://api.deepgram.com/v1/listen";
pub const DEFAULT_MODEL: &str = "nova-2";

pub struct DeepgramProvider {
    api_key: String,
    client: Client,
    base_url: String,
    default_model: String,
}

impl DeepgramProvider {
    /// Create a client pointing at a custom endpoint (useful for testing and proxies).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url,
            default_model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config.base_url.clone().unwrap_or_else(|| API_URL.to_string());
        let mut provider = Self::with_base_url(config.api_key.clone(), base_url)?;
        if let Some(model) = &config.model {
            provider.default_model = model.clone();
        }
        Ok(provider)
    }
}

/// Deepgram sniffs most containers itself, but a precise content type avoids misdetection.
fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") | Some("mpga") | Some("mpeg") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl TranscriptionProvider for DeepgramProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Deepgram
    }

    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<Transcript, ProviderError> {
        let started = Instant::now();
        let model = request.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut query = vec![
            ("model", model.clone()),
            ("smart_format", "true".to_string()),
        ];
        match &request.language {
            Some(language) => query.push(("language", language.clone())),
            None => query.push(("detect_language", "true".to_string())),
        }

        let response = self
            .client
            .post(&self.base_url)
            .query(&query)
            .header("authorization", format!("Token {}", self.api_key))
            .header("content-type", content_type_for(&request.file_name))
            .body(request.audio.to_vec())
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after_ms(&response),
            });
        }

        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<DeepgramErrorBody>(&text)
                .ok()
                .and_then(|body| body.err_msg.or(body.reason))
                .unwrap_or(text);
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<DeepgramResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let channel = body
            .results
            .channels
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Rejected("response contained no channels".into()))?;
        let alternative = channel
            .alternatives
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Rejected("response contained no alternatives".into()))?;

        Ok(Transcript {
            text: alternative.transcript,
            confidence: alternative.confidence,
            detected_language: channel.detected_language.or_else(|| request.language.clone()),
            duration_seconds: body.metadata.and_then(|m| m.duration),
            model: Some(model),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}
