//! # scribe-engine
//!
//! Client for the external speech-recognition engine.
//!
//! The engine is an HTTP service that ingests a finalized object key and
//! returns ordered segments with text and timing. This crate implements the
//! [`scribe_core::TranscriptionProvider`] seam; the engine itself is an
//! external collaborator and entirely out of scope.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use scribe_core::defaults::ENGINE_TIMEOUT_SECS;
use scribe_core::{Error, Result, SegmentDraft, TranscriptOutput, TranscriptionProvider};

/// Engine connection settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the engine service, e.g. `http://whisperx:8000`.
    pub base_url: String,
    /// Per-request timeout. Engine runs are long; see
    /// [`ENGINE_TIMEOUT_SECS`] for the default.
    pub timeout: Duration,
}

impl EngineConfig {
    /// Read configuration from `ENGINE_URL` (required) and
    /// `ENGINE_TIMEOUT_SECS` (optional).
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("ENGINE_URL").map_err(|_| Error::Config("ENGINE_URL is not set".into()))?;
        let timeout = std::env::var("ENGINE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(ENGINE_TIMEOUT_SECS);
        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout),
        })
    }
}

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    object_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    language: Option<String>,
    duration_seconds: f64,
    segments: Vec<EngineSegment>,
}

#[derive(Debug, Deserialize)]
struct EngineSegment {
    start: f64,
    end: f64,
    text: String,
}

/// HTTP transcription provider.
pub struct HttpTranscriptionProvider {
    config: EngineConfig,
    client: reqwest::Client,
}

impl HttpTranscriptionProvider {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build engine client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TranscriptionProvider for HttpTranscriptionProvider {
    #[instrument(
        skip(self),
        fields(subsystem = "engine", component = "http", op = "transcribe")
    )]
    async fn transcribe(
        &self,
        object_key: &str,
        language_hint: Option<&str>,
    ) -> Result<TranscriptOutput> {
        let url = format!("{}/transcribe", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&TranscribeRequest {
                object_key,
                language: language_hint,
            })
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("engine request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "engine returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("malformed engine response: {}", e)))?;

        let segments: Vec<SegmentDraft> = parsed
            .segments
            .into_iter()
            .enumerate()
            .map(|(index, segment)| SegmentDraft {
                sequence_index: index as i32,
                start_seconds: segment.start,
                end_seconds: segment.end,
                text: segment.text,
            })
            .collect();

        info!(
            object_key = %object_key,
            segment_count = segments.len(),
            duration_seconds = parsed.duration_seconds,
            "Engine transcription finished"
        );

        Ok(TranscriptOutput {
            language: parsed.language,
            duration_seconds: parsed.duration_seconds,
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_skips_missing_language() {
        let with = serde_json::to_string(&TranscribeRequest {
            object_key: "k",
            language: Some("en"),
        })
        .unwrap();
        assert!(with.contains(r#""language":"en"#));

        let without = serde_json::to_string(&TranscribeRequest {
            object_key: "k",
            language: None,
        })
        .unwrap();
        assert!(!without.contains("language"));
    }

    #[test]
    fn test_response_parsing_orders_segments() {
        let body = r#"{
            "language": "en",
            "duration_seconds": 12.5,
            "segments": [
                {"start": 0.0, "end": 4.2, "text": "hello"},
                {"start": 4.2, "end": 12.5, "text": "world"}
            ]
        }"#;
        let parsed: TranscribeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[1].text, "world");
    }

    #[test]
    fn test_engine_config_default_timeout() {
        std::env::set_var("ENGINE_URL", "http://localhost:8000");
        std::env::remove_var("ENGINE_TIMEOUT_SECS");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.timeout, Duration::from_secs(ENGINE_TIMEOUT_SECS));
    }
}
