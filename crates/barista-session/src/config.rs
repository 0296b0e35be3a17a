use std::time::Duration;

use barista_types::AudioCodec;
use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "gpt-4o-mini-realtime-preview".to_string()
}

fn default_transcription_model() -> String {
    "gpt-4o-mini-transcribe".to_string()
}

fn default_drain_interval_ms() -> u64 {
    200
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_event_buffer() -> usize {
    256
}

/// Settings for one realtime session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Realtime model requested at connect.
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used to transcribe user audio.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default)]
    pub codec: AudioCodec,
    /// Cadence of the delta drain. Default: 200.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Resubmissions allowed for one rate-limited request. Default: 5.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed wait before a resubmission. Default: 5000.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Inbound event channel capacity of the in-memory transport.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            transcription_model: default_transcription_model(),
            codec: AudioCodec::default(),
            drain_interval_ms: default_drain_interval_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SessionConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_realtime_cadence() {
        let config = SessionConfig::default();
        assert_eq!(config.drain_interval(), Duration::from_millis(200));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.codec, AudioCodec::Opus);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            codec = "pcmu"
            max_retries = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.codec, AudioCodec::Pcmu);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.drain_interval_ms, 200);
        assert_eq!(config.model, "gpt-4o-mini-realtime-preview");
    }

    #[test]
    fn zero_drain_interval_is_clamped() {
        let config = SessionConfig {
            drain_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.drain_interval(), Duration::from_millis(1));
    }
}
