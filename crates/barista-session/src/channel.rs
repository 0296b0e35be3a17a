//! In-memory transport.
//!
//! Stands in for the hosted SDK: every outbound command is recorded, and
//! inbound events are whatever the holder of a [`ChannelHandle`] pushes.
//! Used by the replay harness and by tests.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use barista_transcript::SessionEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::SessionError;
use crate::transport::{
    response_create_event, user_text_event, ConnectRequest, Connection, Connector, Transport,
};

/// Default capacity of the inbound event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
struct TransportState {
    sent: Vec<Value>,
    muted: bool,
    interrupts: usize,
    closed: bool,
}

/// Records every command it is given.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    state: Mutex<TransportState>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every client event sent so far, in order.
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.state).sent.clone()
    }

    /// Types of the client events sent so far.
    pub fn sent_types(&self) -> Vec<String> {
        lock(&self.state)
            .sent
            .iter()
            .map(|e| e["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    pub fn interrupts(&self) -> usize {
        lock(&self.state).interrupts
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    fn open(&self) -> Result<MutexGuard<'_, TransportState>, SessionError> {
        let state = lock(&self.state);
        if state.closed {
            return Err(SessionError::Closed);
        }
        Ok(state)
    }
}

impl Transport for ChannelTransport {
    fn send_event(&self, event: &Value) -> Result<(), SessionError> {
        self.open()?.sent.push(event.clone());
        Ok(())
    }

    fn send_message(&self, text: &str) -> Result<(), SessionError> {
        let mut state = self.open()?;
        state.sent.push(user_text_event(text));
        state.sent.push(response_create_event());
        Ok(())
    }

    fn mute(&self, muted: bool) -> Result<(), SessionError> {
        self.open()?.muted = muted;
        Ok(())
    }

    fn interrupt(&self) -> Result<(), SessionError> {
        self.open()?.interrupts += 1;
        Ok(())
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        if !state.closed {
            info!("closing in-memory transport");
            state.closed = true;
        }
    }
}

/// The test-facing end of one in-memory connection.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    events: mpsc::Sender<SessionEvent>,
    transport: Arc<ChannelTransport>,
}

impl ChannelHandle {
    /// Delivers an inbound event to the session.
    pub async fn push(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events.send(event).await.map_err(|_| SessionError::Closed)
    }

    /// Delivers a raw transport event to the session.
    pub async fn push_transport(&self, payload: Value) -> Result<(), SessionError> {
        self.push(SessionEvent::Transport { payload }).await
    }

    pub fn transport(&self) -> &ChannelTransport {
        &self.transport
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    requests: Vec<ConnectRequest>,
    latest: Option<ChannelHandle>,
    fail_next: Option<String>,
}

/// Hands out in-memory connections. Clones share state, so one clone can be
/// given to a session while another observes it.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    state: Arc<Mutex<ConnectorState>>,
    buffer: usize,
}

impl Default for ChannelConnector {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl ChannelConnector {
    pub fn new(buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectorState::default())),
            buffer: buffer.max(1),
        }
    }

    /// Makes the next handshake fail with `reason`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        lock(&self.state).fail_next = Some(reason.into());
    }

    /// Handle for the most recent successful connection.
    pub fn handle(&self) -> Option<ChannelHandle> {
        lock(&self.state).latest.clone()
    }

    /// Every handshake request received, successful or not.
    pub fn requests(&self) -> Vec<ConnectRequest> {
        lock(&self.state).requests.clone()
    }
}

impl Connector for ChannelConnector {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> impl Future<Output = Result<Connection, SessionError>> + Send {
        let outcome = {
            let mut state = lock(&self.state);
            info!(
                model = %request.model,
                audio_format = request.input_audio_format,
                "opening in-memory connection"
            );
            state.requests.push(request);
            match state.fail_next.take() {
                Some(reason) => Err(SessionError::Handshake(reason)),
                None => {
                    let (tx, rx) = mpsc::channel(self.buffer);
                    let transport = Arc::new(ChannelTransport::new());
                    state.latest = Some(ChannelHandle {
                        events: tx,
                        transport: transport.clone(),
                    });
                    Ok(Connection {
                        transport,
                        events: rx,
                    })
                }
            }
        };
        async move { outcome }
    }
}
