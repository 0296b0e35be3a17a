//! Session lifecycle: connect, dispatch, user actions, teardown.
//!
//! A [`SessionManager`] owns at most one live connection. For that
//! connection it runs up to three tasks:
//!
//! - the pump, which feeds inbound events to the reconciler,
//! - the drain, a repeating timer that applies one queued delta per tick and
//!   exits when the queue is empty,
//! - the retry timer, a one-shot that resends the last request after a rate
//!   limit.
//!
//! All three hold only a weak reference to the manager and a connection
//! generation, so a task that outlives its connection finds nothing to do.
//! Disconnect aborts all three.
//!
//! The connection state lock is always taken before the transcript lock.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use barista_observe::{EventDirection, EventLog, EventPayload};
use barista_transcript::{
    Clock, DrainStep, EventReconciler, ResponseInfo, SessionEvent, SystemClock, TranscriptStore,
};
use barista_types::SessionStatus;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::retry::{RetryController, RetryDecision};
use crate::transport::{
    is_request_event, response_create_event, user_text_event, ConnectRequest, Connector,
    Transport,
};

/// Callbacks into the surrounding application.
pub trait SessionObserver: Send + Sync {
    fn on_connection_change(&self, _status: SessionStatus) {}

    /// The conversation was handed to another agent.
    fn on_agent_handoff(&self, _agent: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct ActiveSession {
    generation: u64,
    transport: Arc<dyn Transport>,
    reconciler: EventReconciler,
    retry: RetryController,
    pump: Option<JoinHandle<()>>,
    drain: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn teardown(mut self) {
        for handle in [
            self.pump.take(),
            self.drain.take(),
            self.retry_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        self.reconciler.reset();
        self.transport.close();
    }
}

struct ConnState {
    status: SessionStatus,
    generation: u64,
    active: Option<ActiveSession>,
}

struct Inner<C> {
    connector: C,
    config: SessionConfig,
    transcript: Arc<Mutex<TranscriptStore>>,
    events: EventLog,
    observer: Arc<dyn SessionObserver>,
    clock: Arc<dyn Clock>,
    state: Mutex<ConnState>,
}

/// Owns the realtime session and everything that lives as long as it.
///
/// Cloning yields another handle to the same session.
pub struct SessionManager<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for SessionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for SessionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C, config: SessionConfig, events: EventLog) -> Self {
        Self::builder(connector, config, events).build()
    }

    pub fn builder(connector: C, config: SessionConfig, events: EventLog) -> SessionBuilder<C> {
        SessionBuilder {
            connector,
            config,
            events,
            observer: Arc::new(NoopObserver),
            clock: Arc::new(SystemClock),
            transcript: Arc::new(Mutex::new(TranscriptStore::new())),
        }
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.inner.state).status
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.state).active.is_some()
    }

    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Shared handle to the transcript. It outlives individual connections.
    pub fn transcript(&self) -> Arc<Mutex<TranscriptStore>> {
        Arc::clone(&self.inner.transcript)
    }

    /// Runs `f` against the transcript under its lock.
    pub fn with_transcript<R>(&self, f: impl FnOnce(&TranscriptStore) -> R) -> R {
        f(&lock(&self.inner.transcript))
    }

    /// Current retry count of the live connection.
    pub fn retry_count(&self) -> Option<u32> {
        lock(&self.inner.state)
            .active
            .as_ref()
            .map(|a| a.retry.count())
    }

    /// Connects unless a connection exists or is being made.
    ///
    /// # Errors
    ///
    /// Returns the connector's error when the handshake fails. The status
    /// stays `Connecting` until [`disconnect`](Self::disconnect) is called.
    /// Returns `SessionError::Aborted` if disconnect ran during the
    /// handshake.
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut state = lock(&self.inner.state);
            if state.status != SessionStatus::Disconnected {
                debug!(status = %state.status, "connect ignored");
                return Ok(());
            }
            state.status = SessionStatus::Connecting;
        }
        self.inner.report_status(SessionStatus::Connecting);

        let request = ConnectRequest::from_config(&self.inner.config);
        info!(
            model = %request.model,
            audio_format = request.input_audio_format,
            "connecting realtime session"
        );
        let connection = match self.inner.connector.connect(request).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("realtime handshake failed: {}", e);
                return Err(e);
            }
        };

        {
            let mut state = lock(&self.inner.state);
            if state.status != SessionStatus::Connecting {
                connection.transport.close();
                warn!("connection completed after disconnect, closing it");
                return Err(SessionError::Aborted);
            }
            state.generation += 1;
            let generation = state.generation;
            let pump = spawn_pump(Arc::downgrade(&self.inner), generation, connection.events);
            state.active = Some(ActiveSession {
                generation,
                transport: connection.transport,
                reconciler: EventReconciler::new(Arc::clone(&self.inner.clock)),
                retry: RetryController::new(
                    self.inner.config.max_retries,
                    self.inner.config.retry_delay(),
                ),
                pump: Some(pump),
                drain: None,
                retry_timer: None,
            });
            state.status = SessionStatus::Connected;
        }
        self.inner.report_status(SessionStatus::Connected);
        info!("realtime session connected");
        Ok(())
    }

    /// Tears the connection down. Safe to call any number of times.
    pub fn disconnect(&self) {
        let (active, changed) = {
            let mut state = lock(&self.inner.state);
            let changed = state.status != SessionStatus::Disconnected;
            state.status = SessionStatus::Disconnected;
            (state.active.take(), changed)
        };
        if let Some(active) = active {
            info!(generation = active.generation, "disconnecting realtime session");
            active.teardown();
        }
        if changed {
            self.inner.report_status(SessionStatus::Disconnected);
        }
    }

    /// Sends a typed user message. Resets retry state; this message is what
    /// a rate-limit retry will resend.
    pub fn send_user_text(&self, text: &str) -> Result<(), SessionError> {
        let request = user_text_event(text);
        self.inner.with_active(|active| {
            active.retry.record_request(request.clone());
            active.transport.send_message(text)
        })?;
        self.inner.events.log_client_event(&request);
        self.inner.events.log_client_event(&response_create_event());
        Ok(())
    }

    /// Sends a raw client event. Request-class events replace the retry
    /// target.
    pub fn send_event(&self, event: Value) -> Result<(), SessionError> {
        self.inner.with_active(|active| {
            if is_request_event(&event) {
                active.retry.record_request(event.clone());
            }
            active.transport.send_event(&event)
        })?;
        self.inner.events.log_client_event(&event);
        Ok(())
    }

    pub fn mute(&self, muted: bool) -> Result<(), SessionError> {
        self.inner.with_active(|active| active.transport.mute(muted))?;
        debug!(muted, "microphone mute changed");
        Ok(())
    }

    pub fn interrupt(&self) -> Result<(), SessionError> {
        self.inner.with_active(|active| active.transport.interrupt())?;
        debug!("response interrupted");
        Ok(())
    }

    /// Starts a push-to-talk turn by discarding buffered input audio.
    pub fn push_to_talk_start(&self) -> Result<(), SessionError> {
        self.send_event(json!({"type": "input_audio_buffer.clear"}))
    }

    /// Ends a push-to-talk turn: commits the buffered audio and asks for a
    /// response.
    pub fn push_to_talk_stop(&self) -> Result<(), SessionError> {
        self.send_event(json!({"type": "input_audio_buffer.commit"}))?;
        self.send_event(json!({"type": "response.create"}))
    }
}

/// Configures optional collaborators of a [`SessionManager`].
pub struct SessionBuilder<C: Connector> {
    connector: C,
    config: SessionConfig,
    events: EventLog,
    observer: Arc<dyn SessionObserver>,
    clock: Arc<dyn Clock>,
    transcript: Arc<Mutex<TranscriptStore>>,
}

impl<C: Connector> SessionBuilder<C> {
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares an existing transcript instead of starting an empty one.
    pub fn transcript(mut self, transcript: Arc<Mutex<TranscriptStore>>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn build(self) -> SessionManager<C> {
        SessionManager {
            inner: Arc::new(Inner {
                connector: self.connector,
                config: self.config,
                transcript: self.transcript,
                events: self.events,
                observer: self.observer,
                clock: self.clock,
                state: Mutex::new(ConnState {
                    status: SessionStatus::Disconnected,
                    generation: 0,
                    active: None,
                }),
            }),
        }
    }
}

impl<C: Connector> Inner<C> {
    fn report_status(&self, status: SessionStatus) {
        info!(status = %status, "session status changed");
        self.events
            .emit_or_warn(&EventPayload::ConnectionStatus { status });
        self.observer.on_connection_change(status);
    }

    fn with_active<R>(
        &self,
        f: impl FnOnce(&mut ActiveSession) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut state = lock(&self.state);
        let active = state.active.as_mut().ok_or(SessionError::NotConnected)?;
        f(active)
    }

    fn dispatch(self: &Arc<Self>, generation: u64, event: SessionEvent) {
        let handoff = {
            let mut state = lock(&self.state);
            let Some(active) = state
                .active
                .as_mut()
                .filter(|a| a.generation == generation)
            else {
                return;
            };

            match &event {
                SessionEvent::Transport { payload } => {
                    self.events.log_server_event(payload);
                }
                SessionEvent::Unrecognized { name, raw } => {
                    self.events
                        .record(EventDirection::Server, name.clone(), raw.clone());
                }
                _ => {}
            }

            let reaction = {
                let mut transcript = lock(&self.transcript);
                active.reconciler.apply(&mut transcript, &event)
            };
            for notice in &reaction.notices {
                self.events.emit_or_warn(notice);
            }
            if reaction.start_drain {
                if let Some(previous) = active.drain.take() {
                    previous.abort();
                }
                active.drain = Some(spawn_drain(
                    Arc::downgrade(self),
                    generation,
                    self.config.drain_interval(),
                ));
            }
            if let Some(response) = &reaction.response_done {
                self.on_response_done(active, response);
            }
            reaction.handoff
        };

        if let Some(agent) = handoff {
            info!(agent = %agent, "agent handoff");
            self.observer.on_agent_handoff(&agent);
        }
    }

    fn on_response_done(self: &Arc<Self>, active: &mut ActiveSession, response: &ResponseInfo) {
        match active.retry.on_response_done(response) {
            RetryDecision::Retry { attempt, delay } => {
                let message = active.retry.retry_message(attempt);
                warn!(attempt, max_retries = active.retry.max_retries(), "{}", message);
                self.events.emit_or_warn(&EventPayload::RateLimitRetry {
                    attempt,
                    max_retries: active.retry.max_retries(),
                    message,
                });
                if let Some(previous) = active.retry_timer.take() {
                    previous.abort();
                }
                let weak = Arc::downgrade(self);
                let generation = active.generation;
                active.retry_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.resend(generation, attempt);
                    }
                }));
            }
            RetryDecision::GiveUp { max_retries } => {
                let message = active.retry.give_up_message();
                error!(max_retries, "{}", message);
                self.events.emit_or_warn(&EventPayload::RateLimitMaxRetries {
                    max_retries,
                    message,
                });
            }
            RetryDecision::Reset | RetryDecision::Unchanged => {}
        }
    }

    fn resend(&self, generation: u64, attempt: u32) {
        let request = {
            let mut state = lock(&self.state);
            let Some(active) = state
                .active
                .as_mut()
                .filter(|a| a.generation == generation)
            else {
                return;
            };
            active.retry_timer = None;
            let Some(request) = active.retry.last_request().cloned() else {
                debug!("rate limit retry fired with no request to resend");
                return;
            };
            if let Err(e) = active.transport.send_event(&request) {
                warn!(attempt, "retry resend failed: {}", e);
                return;
            }
            request
        };
        info!(attempt, "resent rate limited request");
        self.events.log_client_event(&request);
    }

    /// One drain tick. Returns whether the drain should keep running.
    fn drain_tick(&self, generation: u64) -> bool {
        let mut state = lock(&self.state);
        let Some(active) = state
            .active
            .as_mut()
            .filter(|a| a.generation == generation)
        else {
            return false;
        };
        let mut transcript = lock(&self.transcript);
        match active.reconciler.drain_tick(&mut transcript) {
            DrainStep::Applied { more, .. } => more,
            DrainStep::Idle => false,
        }
    }
}

fn spawn_pump<C: Connector>(
    inner: Weak<Inner<C>>,
    generation: u64,
    mut events: mpsc::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(strong) = inner.upgrade() else {
                break;
            };
            debug!(kind = event.kind(), "session event");
            strong.dispatch(generation, event);
        }
        debug!(generation, "session event stream ended");
    })
}

fn spawn_drain<C: Connector>(
    inner: Weak<Inner<C>>,
    generation: u64,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the first fragment waits a
        // full period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(strong) = inner.upgrade() else {
                break;
            };
            if !strong.drain_tick(generation) {
                break;
            }
        }
    })
}
