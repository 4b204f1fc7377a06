//! Stream session state machine.
//!
//! A [`Session`] is driven by discrete events and answers with [`Effect`]s
//! for a driver to execute. It never touches the network itself, so every
//! transition can be exercised without a live server.
//!
//! ```text
//! Idle ──open──▶ Connecting ──Opened──▶ Active ──complete/close/error/cancel──▶ Terminated
//!                    └──────────error/cancel───────────────────────────────────────▲
//! ```

use serde_json::json;
use tracing::{debug, info, warn};

use crate::classifier::{self, InboundMessage, RawMessage};
use crate::display::DisplayState;
use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
    /// Absorbing: nothing leaves this state.
    Terminated,
}

/// Something the channel reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is established.
    Opened,
    Message(RawMessage),
    /// The channel closed. `reason` is the peer's close reason, if any.
    Closed { reason: Option<String> },
    Error(ConnectionError),
}

/// Work the driver must perform on the session's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the connection.
    Connect,
    /// Send one text message.
    Send(String),
    /// Close the connection.
    Close,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed(ConnectionError),
}

/// One processing run over one connection. Not reusable once terminated.
#[derive(Debug)]
pub struct Session {
    file_ref: String,
    status: SessionStatus,
    start_sent: bool,
    close_issued: bool,
    outcome: Option<Outcome>,
}

impl Session {
    pub fn new(file_ref: impl Into<String>) -> Self {
        Self {
            file_ref: file_ref.into(),
            status: SessionStatus::Idle,
            start_sent: false,
            close_issued: false,
            outcome: None,
        }
    }

    pub fn file_ref(&self) -> &str {
        &self.file_ref
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminated(&self) -> bool {
        self.status == SessionStatus::Terminated
    }

    /// `None` until the session terminates.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// The single start command sent once the connection is up.
    pub fn start_command(&self) -> String {
        json!({ "file_path": self.file_ref }).to_string()
    }

    /// Begin connecting. Only valid from `Idle`.
    pub fn open(&mut self, state: &mut DisplayState) -> Vec<Effect> {
        if self.status != SessionStatus::Idle {
            warn!(status = ?self.status, "open ignored: session already used");
            return Vec::new();
        }
        info!(file_ref = %self.file_ref, "opening stream session");
        self.status = SessionStatus::Connecting;
        state.on_processing_start();
        vec![Effect::Connect]
    }

    /// Apply one channel event.
    pub fn handle(&mut self, event: SessionEvent, state: &mut DisplayState) -> Vec<Effect> {
        match event {
            SessionEvent::Opened => self.on_opened(),
            SessionEvent::Message(raw) => self.on_message(raw, state),
            SessionEvent::Closed { reason } => self.on_closed(reason, state),
            SessionEvent::Error(err) => self.on_error(err, state),
        }
    }

    /// Tear the session down from the caller's side. Idempotent.
    pub fn cancel(&mut self, state: &mut DisplayState) -> Vec<Effect> {
        if self.is_terminated() {
            return Vec::new();
        }
        info!(status = ?self.status, "cancelling stream session");
        let was_active = self.status == SessionStatus::Active;
        self.terminate(Outcome::Cancelled);
        state.on_stopped();
        if was_active { self.close() } else { Vec::new() }
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        match self.status {
            SessionStatus::Connecting => {
                self.status = SessionStatus::Active;
                if self.start_sent {
                    return Vec::new();
                }
                self.start_sent = true;
                debug!(file_ref = %self.file_ref, "connection open, sending start command");
                vec![Effect::Send(self.start_command())]
            }
            // A connection that came up after we gave up must not linger.
            SessionStatus::Terminated => self.close(),
            SessionStatus::Idle | SessionStatus::Active => {
                warn!(status = ?self.status, "unexpected open event");
                Vec::new()
            }
        }
    }

    fn on_message(&mut self, raw: RawMessage, state: &mut DisplayState) -> Vec<Effect> {
        if self.status != SessionStatus::Active {
            debug!(status = ?self.status, "dropping message outside active session");
            return Vec::new();
        }

        match classifier::classify(raw) {
            Ok(InboundMessage::Progress(p)) => {
                debug!(progress = p, "progress");
                state.on_progress(p);
                Vec::new()
            }
            Ok(InboundMessage::Frame(frame)) => {
                debug!(bytes = frame.bytes.len(), "frame");
                state.on_frame(frame);
                Vec::new()
            }
            Ok(InboundMessage::Complete) => {
                info!("processing complete");
                state.on_complete();
                self.terminate(Outcome::Completed);
                self.close()
            }
            Err(e) => {
                warn!(error = %e, "discarding unrecognized message");
                Vec::new()
            }
        }
    }

    fn on_closed(&mut self, reason: Option<String>, state: &mut DisplayState) -> Vec<Effect> {
        if self.is_terminated() {
            return Vec::new();
        }
        // The peer closed; there is nothing left for us to close.
        self.close_issued = true;
        let err = ConnectionError::AbnormalClose(
            reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "closed before processing completed".to_string()),
        );
        warn!(error = %err, "stream closed by server");
        state.on_error(&err);
        self.terminate(Outcome::Failed(err));
        Vec::new()
    }

    fn on_error(&mut self, err: ConnectionError, state: &mut DisplayState) -> Vec<Effect> {
        if self.is_terminated() {
            return Vec::new();
        }
        let was_active = self.status == SessionStatus::Active;
        tracing::error!(error = %err, "stream session failed");
        state.on_error(&err);
        self.terminate(Outcome::Failed(err));
        if was_active { self.close() } else { Vec::new() }
    }

    fn terminate(&mut self, outcome: Outcome) {
        self.status = SessionStatus::Terminated;
        self.outcome = Some(outcome);
    }

    fn close(&mut self) -> Vec<Effect> {
        if self.close_issued {
            return Vec::new();
        }
        self.close_issued = true;
        vec![Effect::Close]
    }
}
