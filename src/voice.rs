//! Speech interface
//!
//! Only the disabled engine ships; it accepts requests and answers with empty
//! text and audio so callers exercise the same code paths.

use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[async_trait]
pub trait VoiceEngine: Send + Sync {
    fn name(&self) -> &'static str;
    async fn speech_to_text(&self, audio: &[u8]) -> Result<String>;
    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>>;
    async fn available_voices(&self) -> Result<Vec<VoiceInfo>>;
}

pub struct DisabledVoiceEngine;

#[async_trait]
impl VoiceEngine for DisabledVoiceEngine {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn speech_to_text(&self, audio: &[u8]) -> Result<String> {
        info!(bytes = audio.len(), "Speech-to-text requested, voice processing disabled");
        Ok(String::new())
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>> {
        info!(chars = text.len(), "Text-to-speech requested, voice processing disabled");
        Ok(Vec::new())
    }

    async fn available_voices(&self) -> Result<Vec<VoiceInfo>> {
        Ok(Vec::new())
    }
}

pub fn encode_audio(audio: &[u8]) -> String {
    STANDARD.encode(audio)
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| AssistantError::InvalidInput(format!("audio is not valid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_engine_returns_empty() {
        let engine = DisabledVoiceEngine;
        assert_eq!(engine.speech_to_text(b"RIFF....").await.unwrap(), "");
        assert!(engine.text_to_speech("hello").await.unwrap().is_empty());
        assert!(engine.available_voices().await.unwrap().is_empty());
    }

    #[test]
    fn test_audio_base64() {
        let encoded = encode_audio(&[0, 1, 2, 255]);
        assert_eq!(encoded, "AAEC/w==");
        let decoded = tokio_test::assert_ok!(decode_audio(" AAEC/w==\n"));
        assert_eq!(decoded, vec![0, 1, 2, 255]);
        assert!(matches!(
            decode_audio("not base64!"),
            Err(AssistantError::InvalidInput(_))
        ));
    }
}
