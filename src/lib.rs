//! Upload a video to a processing server and follow the run as it streams
//! progress and preview frames back over a WebSocket.
//!
//! The pieces, leaf first:
//!
//! - [`transfer`]: one-shot multipart upload returning a server file reference
//! - [`classifier`]: turns each inbound message into progress, completion or a frame
//! - [`display`]: the phase/progress/frame state a presentation layer renders
//! - [`session`]: the per-run state machine, free of any I/O
//! - [`transport`]: WebSocket plumbing behind the [`transport::Connector`] seam
//! - [`client`]: ties upload and session together under a cancellation token

pub mod classifier;
pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod session;
pub mod theme;
pub mod transfer;
pub mod transport;

pub use client::{Client, RunOutcome};
pub use config::Config;
pub use display::{DisplaySink, DisplayState, Phase};
pub use error::{ClassifierError, ConnectionError, RunError, UploadError};
