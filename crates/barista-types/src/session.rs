//! Connection status and audio codec selection.

use serde::{Deserialize, Serialize};

/// Connection state of a realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio codec requested for the voice channel.
///
/// Narrow-band codecs simulate how the agent sounds over a phone line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Opus,
    Pcmu,
    Pcma,
}

impl AudioCodec {
    /// Returns the codec name as accepted by [`str::parse`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Pcmu => "pcmu",
            Self::Pcma => "pcma",
        }
    }

    /// Audio format the realtime service should use with this codec.
    pub fn audio_format(self) -> &'static str {
        match self {
            Self::Opus => "pcm16",
            Self::Pcmu => "g711_ulaw",
            Self::Pcma => "g711_alaw",
        }
    }
}

impl std::str::FromStr for AudioCodec {
    type Err = ParseAudioCodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opus" => Ok(Self::Opus),
            "pcmu" => Ok(Self::Pcmu),
            "pcma" => Ok(Self::Pcma),
            _ => Err(ParseAudioCodecError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown codec name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown audio codec: {0}")]
pub struct ParseAudioCodecError(pub String);
