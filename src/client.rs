//! Upload-then-stream orchestration.
//!
//! [`Client::run`] uploads a file, opens one [`Session`] keyed by the
//! returned reference and drives it to termination. The client owns the
//! [`DisplayState`]; `run` takes `&mut self`, so a second run cannot start
//! while one is still live.

use std::collections::VecDeque;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::display::{DisplaySink, DisplayState};
use crate::error::{ConnectionError, Result, UploadError};
use crate::session::{Effect, Outcome, Session, SessionEvent};
use crate::transfer::{HttpTransfer, Transfer, UploadRequest};
use crate::transport::{Connector, StreamTransport, WsConnector};

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { file_ref: String },
    Cancelled,
}

pub struct Client<T, C> {
    config: Config,
    transfer: T,
    connector: C,
    state: DisplayState,
    sink: Box<dyn DisplaySink>,
}

impl Client<HttpTransfer, WsConnector> {
    /// Client talking HTTP + WebSocket to the configured server.
    pub fn from_config(config: Config, sink: Box<dyn DisplaySink>) -> Result<Self> {
        let transfer = HttpTransfer::new(&config)?;
        Ok(Self::new(config, transfer, WsConnector, sink))
    }
}

impl<T: Transfer, C: Connector> Client<T, C> {
    pub fn new(config: Config, transfer: T, connector: C, sink: Box<dyn DisplaySink>) -> Self {
        Self {
            config,
            transfer,
            connector,
            state: DisplayState::new(),
            sink,
        }
    }

    /// Replace the display state, e.g. to share a frame ledger.
    pub fn with_state(mut self, state: DisplayState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Upload `request` and stream processing results until the session ends.
    ///
    /// Cancelling `cancel` tears the run down from whichever stage it is in.
    /// Upload failures abort before any connection is attempted.
    pub async fn run(
        &mut self,
        request: Option<UploadRequest>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let request = request.ok_or(UploadError::NoFileSelected)?;
        request.validate(&self.config.accepted_media_prefix)?;

        self.state.on_upload_start();
        self.sink.render(&self.state);

        let uploaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("run cancelled during upload");
                self.state.on_stopped();
                self.sink.render(&self.state);
                return Ok(RunOutcome::Cancelled);
            }
            result = self.transfer.upload(request) => result,
        };
        let uploaded = match uploaded {
            Ok(uploaded) => uploaded,
            Err(e) => {
                self.state.on_error(&e);
                self.sink.render(&self.state);
                return Err(e.into());
            }
        };
        info!(file_ref = %uploaded.file_ref, "upload accepted");

        let url = match self.config.stream_url() {
            Ok(url) => url,
            Err(e) => {
                self.state.on_error(&e);
                self.sink.render(&self.state);
                return Err(e.into());
            }
        };

        let mut session = Session::new(uploaded.file_ref.clone());
        drive(
            &mut session,
            &mut self.state,
            self.sink.as_mut(),
            &self.connector,
            &url,
            self.config.stall_timeout(),
            &cancel,
        )
        .await;

        match session.outcome() {
            Some(Outcome::Completed) => Ok(RunOutcome::Completed {
                file_ref: uploaded.file_ref,
            }),
            Some(Outcome::Failed(e)) => Err(e.clone().into()),
            Some(Outcome::Cancelled) | None => Ok(RunOutcome::Cancelled),
        }
    }
}

/// Run one session to termination against a live connector.
///
/// The start command is sent before the first inbound read, and inbound
/// events are applied strictly one at a time in delivery order.
pub async fn drive(
    session: &mut Session,
    state: &mut DisplayState,
    sink: &mut dyn DisplaySink,
    connector: &dyn Connector,
    url: &Url,
    stall_timeout: Option<Duration>,
    cancel: &CancellationToken,
) {
    let effects = session.open(state);
    sink.render(state);
    if !effects.contains(&Effect::Connect) {
        return;
    }

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            session.cancel(state);
            sink.render(state);
            return;
        }
        result = connector.connect(url) => result,
    };
    let mut transport = match connected {
        Ok(transport) => transport,
        Err(e) => {
            session.handle(SessionEvent::Error(e), state);
            sink.render(state);
            return;
        }
    };

    let effects = session.handle(SessionEvent::Opened, state);
    sink.render(state);
    apply(effects, session, state, sink, transport.as_mut()).await;

    while !session.is_terminated() {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            event = next_event(transport.as_mut(), stall_timeout) => Some(event),
        };
        let effects = match event {
            Some(event) => session.handle(event, state),
            None => session.cancel(state),
        };
        sink.render(state);
        apply(effects, session, state, sink, transport.as_mut()).await;
    }
}

async fn next_event(transport: &mut dyn StreamTransport, stall: Option<Duration>) -> SessionEvent {
    match stall {
        Some(limit) => match tokio::time::timeout(limit, transport.next_event()).await {
            Ok(event) => event,
            Err(_) => SessionEvent::Error(ConnectionError::Stalled(limit)),
        },
        None => transport.next_event().await,
    }
}

/// Execute effects in order. A failed send is fed back as a connection error,
/// which may itself queue a close.
async fn apply(
    effects: Vec<Effect>,
    session: &mut Session,
    state: &mut DisplayState,
    sink: &mut dyn DisplaySink,
    transport: &mut dyn StreamTransport,
) {
    let mut queue: VecDeque<Effect> = effects.into();
    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::Send(text) => {
                if let Err(e) = transport.send_text(text).await {
                    queue.extend(session.handle(SessionEvent::Error(e), state));
                    sink.render(state);
                }
            }
            Effect::Close => {
                if let Err(e) = transport.close().await {
                    warn!(error = %e, "error while closing stream");
                }
            }
            Effect::Connect => warn!("connect requested on an open transport"),
        }
    }
}
