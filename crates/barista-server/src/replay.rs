//! Scripted replays through the in-memory transport.
//!
//! A script is JSON lines. Each line is either a session event exactly as
//! the realtime SDK would deliver it (tagged by `event`), or a user action
//! tagged by `action`:
//!
//! ```text
//! {"action":"send_text","text":"Large latte please"}
//! {"event":"transport","payload":{"type":"response.audio_transcript.delta","item_id":"a1","delta":"Sure"}}
//! {"action":"wait","ms":1000}
//! ```
//!
//! Blank lines are skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use barista_session::{ChannelConnector, SessionError, SessionManager};
use barista_transcript::{SessionEvent, TranscriptError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read replay script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: not valid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: {source}")]
    Event {
        line: usize,
        #[source]
        source: TranscriptError,
    },

    #[error("line {line}: unknown action: {source}")]
    Action {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("session has no in-memory connection to replay into")]
    NoConnection,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Something the user does during a replay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    SendText { text: String },
    PttStart,
    PttStop,
    Interrupt,
    Mute { muted: bool },
    /// Pause on top of the regular pacing.
    Wait { ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    Event(SessionEvent),
    Action(ReplayAction),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayScript {
    steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn parse(source: &str) -> Result<Self, ReplayError> {
        let mut steps = Vec::new();
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let value: Value =
                serde_json::from_str(raw).map_err(|source| ReplayError::Json { line, source })?;
            let step = if value.get("action").is_some() {
                ReplayStep::Action(
                    serde_json::from_value(value)
                        .map_err(|source| ReplayError::Action { line, source })?,
                )
            } else {
                ReplayStep::Event(
                    SessionEvent::from_value(value)
                        .map_err(|source| ReplayError::Event { line, source })?,
                )
            };
            steps.push(step);
        }
        Ok(Self { steps })
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let source = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    pub fn steps(&self) -> &[ReplayStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Plays `script` into `session`, connecting first if needed. `connector`
/// must be the one the session was built with.
///
/// Returns the number of steps played.
pub async fn run(
    session: &SessionManager<ChannelConnector>,
    connector: &ChannelConnector,
    script: &ReplayScript,
    pacing: Duration,
) -> Result<usize, ReplayError> {
    if !session.is_connected() {
        session.connect().await?;
    }
    let handle = connector.handle().ok_or(ReplayError::NoConnection)?;
    info!(steps = script.len(), "starting replay");

    for step in script.steps() {
        match step {
            ReplayStep::Event(event) => {
                debug!(kind = event.kind(), "replaying session event");
                handle.push(event.clone()).await?;
            }
            ReplayStep::Action(action) => {
                debug!(?action, "replaying user action");
                match action {
                    ReplayAction::SendText { text } => session.send_user_text(text)?,
                    ReplayAction::PttStart => session.push_to_talk_start()?,
                    ReplayAction::PttStop => session.push_to_talk_stop()?,
                    ReplayAction::Interrupt => session.interrupt()?,
                    ReplayAction::Mute { muted } => session.mute(*muted)?,
                    ReplayAction::Wait { ms } => {
                        tokio::time::sleep(Duration::from_millis(*ms)).await;
                    }
                }
            }
        }
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    info!(steps = script.len(), "replay finished");
    Ok(script.len())
}
