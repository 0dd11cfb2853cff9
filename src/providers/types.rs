//! Wire types for the back-end HTTP APIs.
//!
//! Only the fields the adapters read are modelled; serde ignores the rest.

use serde::Deserialize;

/// Body of `POST /v1/audio/transcriptions` (OpenAI) in `json` or `verbose_json` format.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiTranscription {
    pub text: String,
    /// Only present in `verbose_json`; OpenAI reports the language name, e.g. "english".
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<OpenAiSegment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSegment {
    pub avg_logprob: f64,
}

/// Error envelope returned by OpenAI on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorBody {
    pub error: OpenAiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorDetail {
    pub message: String,
}

/// Body of `POST /v1/listen` (Deepgram pre-recorded audio).
#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramResponse {
    #[serde(default)]
    pub metadata: Option<DeepgramMetadata>,
    pub results: DeepgramResults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramMetadata {
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramResults {
    #[serde(default)]
    pub channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramChannel {
    #[serde(default)]
    pub alternatives: Vec<DeepgramAlternative>,
    #[serde(default)]
    pub detected_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramAlternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Error envelope returned by Deepgram on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct DeepgramErrorBody {
    #[serde(default)]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}
