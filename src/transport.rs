//! Channel plumbing between a [`Session`](crate::session::Session) and the
//! processing server.
//!
//! [`Connector`] and [`StreamTransport`] are the seams the session driver
//! talks to. [`WsConnector`] implements them over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use crate::classifier::RawMessage;
use crate::error::ConnectionError;
use crate::session::SessionEvent;

/// An open bidirectional message channel.
#[async_trait]
pub trait StreamTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Wait for the next inbound event. Returns `Message`, `Closed` or `Error`.
    async fn next_event(&mut self) -> SessionEvent;

    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Opens channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn StreamTransport>, ConnectionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn StreamTransport>, ConnectionError> {
        debug!(%url, "connecting");
        if url.scheme() == "wss" {
            install_crypto_provider();
        }
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::EstablishFailed(e.to_string()))?;
        Ok(Box::new(WsTransport { stream }))
    }
}

/// Make aws-lc-rs the process-wide rustls provider unless one is already set.
fn install_crypto_provider() {
    // Err only means another provider won the race.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dropping it without `close` still shuts the socket down, just without a
/// close handshake.
pub struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| ConnectionError::AbnormalClose(e.to_string()))
    }

    async fn next_event(&mut self) -> SessionEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return SessionEvent::Message(RawMessage::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return SessionEvent::Message(RawMessage::Binary(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    return SessionEvent::Closed {
                        reason: frame.map(|f| f.reason.as_str().to_owned()),
                    };
                }
                // tungstenite answers pings itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    return SessionEvent::Error(ConnectionError::AbnormalClose(e.to_string()));
                }
                None => return SessionEvent::Closed { reason: None },
            }
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(ConnectionError::AbnormalClose(e.to_string())),
        }
    }
}
