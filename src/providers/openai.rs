use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};

use super::error::ProviderError;
use super::types::{OpenAiErrorBody, OpenAiTranscription};
use super::{ProviderId, Transcript, TranscriptionProvider, TranscriptionRequest, retry_after_ms};
use crate::config::ProviderConfig;

const API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_MODEL: &str = "whisper-1";

pub struct OpenAiProvider {
    api_key: String,
    client: Client,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
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

/// Only the whisper family supports `verbose_json`; newer models answer plain `json`.
fn response_format(model: &str) -> &'static str {
    if model.starts_with("whisper") {
        "verbose_json"
    } else {
        "json"
    }
}

/// Mean per-segment probability, derived from the segments' average log-probability.
fn segment_confidence(body: &OpenAiTranscription) -> Option<f32> {
    if body.segments.is_empty() {
        return None;
    }
    let total: f64 = body.segments.iter().map(|s| s.avg_logprob.exp()).sum();
    Some((total / body.segments.len() as f64) as f32)
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<Transcript, ProviderError> {
        let started = Instant::now();
        let model = request.model.clone().unwrap_or_else(|| self.default_model.clone());

        let file = Part::bytes(request.audio.to_vec()).file_name(request.file_name.clone());
        let mut form = Form::new()
            .part("file", file)
            .text("model", model.clone())
            .text("response_format", response_format(&model));
        if let Some(language) = &request.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
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
            let message = serde_json::from_str::<OpenAiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<OpenAiTranscription>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(Transcript {
            confidence: segment_confidence(&body),
            text: body.text.trim().to_string(),
            detected_language: body.language,
            duration_seconds: body.duration,
            model: Some(model),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(model: Option<&str>) -> TranscriptionRequest {
        TranscriptionRequest {
            audio: Arc::new(b"RIFF....WAVE".to_vec()),
            file_name: "clip.wav".into(),
            language: Some("en".into()),
            model: model.map(str::to_string),
        }
    }

    async fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::with_base_url(
            "sk-test".into(),
            format!("{}/v1/audio/transcriptions", server.uri()),
        )
        .unwrap()
    }

    #[test]
    fn response_format_depends_on_model_family() {
        assert_eq!(response_format("whisper-1"), "verbose_json");
        assert_eq!(response_format("gpt-4o-transcribe"), "json");
    }

    #[tokio::test]
    async fn transcribe_maps_verbose_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "language": "english",
                "duration": 1.5,
                "text": " hello there ",
                "segments": [{"avg_logprob": 0.0}]
            })))
            .mount(&server)
            .await;

        let transcript = provider_for(&server).await.transcribe(&request(None)).await.unwrap();
        assert_eq!(transcript.text, "hello there");
        assert_eq!(transcript.detected_language.as_deref(), Some("english"));
        assert_eq!(transcript.duration_seconds, Some(1.5));
        assert_eq!(transcript.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(transcript.confidence, Some(1.0));
    }

    #[tokio::test]
    async fn transcribe_surfaces_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .await
            .transcribe(&request(Some("gpt-4o-transcribe")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API error (status 401): Incorrect API key provided");
    }

    #[tokio::test]
    async fn transcribe_reports_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider_for(&server).await.transcribe(&request(None)).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_ms: 7000 }));
    }

    #[tokio::test]
    async fn transcribe_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider_for(&server).await.transcribe(&request(None)).await.unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }
}
