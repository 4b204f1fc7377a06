//! Progress and display state observed by the presentation layer.
//!
//! All update functions are pure state mutations; no I/O happens here.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

use crate::classifier::FramePayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Uploading,
    Processing,
    Complete,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Uploading => "uploading",
            Phase::Processing => "processing",
            Phase::Complete => "complete",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

/// Counts frame handles that are currently alive.
#[derive(Debug, Clone, Default)]
pub struct FrameLedger {
    live: Arc<AtomicUsize>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> FrameLedger {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.clone()
    }
}

/// A displayable frame. Dropping the handle releases it.
pub struct FrameHandle {
    seq: u64,
    bytes: Bytes,
    media_type: &'static str,
    ledger: FrameLedger,
}

impl FrameHandle {
    /// Position of this frame in the run, starting at 1.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared copy of the encoded frame, for consumers that outlive the handle.
    pub fn payload(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHandle")
            .field("seq", &self.seq)
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Client-owned state for one run, read-only to presentation.
#[derive(Debug, Default)]
pub struct DisplayState {
    phase: Phase,
    progress: u8,
    current_frame: Option<FrameHandle>,
    frames_received: u64,
    last_error: Option<String>,
    ledger: FrameLedger,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a shared ledger so callers can observe live frame handles.
    pub fn with_ledger(ledger: FrameLedger) -> Self {
        Self {
            ledger,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn current_frame(&self) -> Option<&FrameHandle> {
        self.current_frame.as_ref()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn ledger(&self) -> &FrameLedger {
        &self.ledger
    }

    pub fn on_upload_start(&mut self) {
        self.phase = Phase::Uploading;
        self.progress = 0;
        self.current_frame = None;
        self.frames_received = 0;
        self.last_error = None;
    }

    pub fn on_processing_start(&mut self) {
        self.phase = Phase::Processing;
        self.progress = 0;
    }

    /// Store the latest reported value verbatim; ignored outside processing.
    pub fn on_progress(&mut self, progress: u8) {
        if self.phase == Phase::Processing {
            self.progress = progress.min(100);
        }
    }

    /// Replace the current frame. The previous handle is dropped before the
    /// new one is created, so at most one is ever alive.
    pub fn on_frame(&mut self, payload: FramePayload) {
        self.current_frame = None;
        self.frames_received += 1;
        self.current_frame = Some(FrameHandle {
            seq: self.frames_received,
            bytes: payload.bytes,
            media_type: payload.media_type,
            ledger: self.ledger.acquire(),
        });
    }

    pub fn on_complete(&mut self) {
        self.phase = Phase::Complete;
        self.progress = 100;
    }

    pub fn on_error(&mut self, cause: impl fmt::Display) {
        self.phase = Phase::Error;
        self.last_error = Some(cause.to_string());
    }

    /// Leave processing without an error, e.g. after a local cancel.
    pub fn on_stopped(&mut self) {
        if matches!(self.phase, Phase::Processing | Phase::Uploading) {
            self.phase = Phase::Idle;
        }
    }
}

/// Receives the state after every mutation.
pub trait DisplaySink: Send {
    fn render(&mut self, state: &DisplayState);
}

/// Sink that discards updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn render(&mut self, _state: &DisplayState) {}
}
