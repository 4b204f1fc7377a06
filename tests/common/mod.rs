//! Mock processing server for integration tests.
//!
//! Serves `POST /upload` (multipart, field `file`) and `GET /ws`, where each
//! connection waits for the start command and then plays a fixed script.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Buf;
use futures_util::{SinkExt, StreamExt, TryStreamExt};
use serde_json::json;
use warp::Filter;
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::ws::{Message, WebSocket};

use vidwatch::config::Config;
use vidwatch::display::{DisplaySink, DisplayState, Phase};

/// One step the stream endpoint plays after receiving the start command.
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Binary(Vec<u8>),
    Pause(Duration),
    Close,
}

impl Step {
    pub fn progress(p: i64) -> Self {
        Step::Text(json!({ "progress": p }).to_string())
    }

    pub fn complete() -> Self {
        Step::Text(json!({ "message": "Video processing complete" }).to_string())
    }
}

/// How the upload endpoint answers.
#[derive(Debug, Clone)]
pub enum UploadReply {
    Accept { file_path: String },
    Reject { status: u16, message: String },
}

#[derive(Debug, Default)]
pub struct ServerLog {
    /// (file name, content type, byte count) per upload.
    pub uploads: Vec<(String, String, usize)>,
    /// Raw contents of the last uploaded file.
    pub last_upload: Vec<u8>,
    pub ws_connections: usize,
    pub start_commands: Vec<String>,
    /// Text messages received after the start command.
    pub extra_texts: usize,
    /// Close frames received from the client.
    pub client_closes: usize,
    /// Set once the server has observed the client going away.
    pub finished: bool,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub log: Arc<Mutex<ServerLog>>,
}

impl MockServer {
    pub async fn start(reply: UploadReply, script: Vec<Step>) -> Self {
        let log = Arc::new(Mutex::new(ServerLog::default()));

        let upload_log = log.clone();
        let upload = warp::path("upload")
            .and(warp::post())
            .and(warp::multipart::form().max_length(64 * 1024 * 1024))
            .and_then(move |form: FormData| {
                let log = upload_log.clone();
                let reply = reply.clone();
                async move { handle_upload(form, log, reply).await }
            });

        let ws_log = log.clone();
        let stream = warp::path("ws").and(warp::ws()).map(move |ws: warp::ws::Ws| {
            let log = ws_log.clone();
            let script = script.clone();
            ws.on_upgrade(move |socket| serve_stream(socket, log, script))
        });

        let (addr, server) = warp::serve(upload.or(stream)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        Self { addr, log }
    }

    pub fn config(&self) -> Config {
        Config {
            server_url: format!("http://{}", self.addr),
            ..Config::default()
        }
    }

    /// Poll the log until `pred` holds or two seconds pass.
    pub async fn wait_for(&self, pred: impl Fn(&ServerLog) -> bool) -> bool {
        for _ in 0..200 {
            if pred(&self.log.lock().unwrap()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

async fn handle_upload(
    form: FormData,
    log: Arc<Mutex<ServerLog>>,
    reply: UploadReply,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, warp::Rejection> {
    let mut parts = Box::pin(form);
    while let Some(part) = parts.next().await {
        let part = part.map_err(|_| warp::reject())?;
        if part.name() != "file" {
            continue;
        }
        let name = part.filename().unwrap_or_default().to_string();
        let content_type = part.content_type().unwrap_or_default().to_string();
        let data = part
            .stream()
            .try_fold(Vec::new(), |mut acc, buf| async move {
                acc.extend_from_slice(buf.chunk());
                Ok(acc)
            })
            .await
            .map_err(|_| warp::reject())?;
        {
            let mut guard = log.lock().unwrap();
            guard.uploads.push((name, content_type, data.len()));
            guard.last_upload = data;
        }
    }

    Ok(match reply {
        UploadReply::Accept { file_path } => warp::reply::with_status(
            warp::reply::json(&json!({
                "message": "File uploaded successfully",
                "file_path": file_path,
            })),
            StatusCode::OK,
        ),
        UploadReply::Reject { status, message } => warp::reply::with_status(
            warp::reply::json(&json!({ "message": message })),
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ),
    })
}

async fn serve_stream(socket: WebSocket, log: Arc<Mutex<ServerLog>>, script: Vec<Step>) {
    let (mut tx, mut rx) = socket.split();
    log.lock().unwrap().ws_connections += 1;

    match rx.next().await {
        Some(Ok(msg)) if msg.is_text() => {
            let text = msg.to_str().unwrap_or_default().to_string();
            log.lock().unwrap().start_commands.push(text);
        }
        _ => {
            log.lock().unwrap().finished = true;
            return;
        }
    }

    let reader_log = log.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = rx.next().await {
            match msg {
                Ok(m) if m.is_close() => reader_log.lock().unwrap().client_closes += 1,
                Ok(m) if m.is_text() => reader_log.lock().unwrap().extra_texts += 1,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        reader_log.lock().unwrap().finished = true;
    });

    for step in script {
        let sent = match step {
            Step::Text(text) => tx.send(Message::text(text)).await,
            Step::Binary(data) => tx.send(Message::binary(data)).await,
            Step::Pause(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Step::Close => tx.send(Message::close()).await,
        };
        if sent.is_err() {
            break;
        }
    }
    let _ = reader.await;
}

/// One rendered state, as the presentation layer saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub progress: u8,
    pub frame: Option<Vec<u8>>,
    pub live_frames: usize,
}

/// Sink that records every render.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub seen: Arc<Mutex<Vec<Snapshot>>>,
}

impl RecordingSink {
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.seen.lock().unwrap().clone()
    }

    /// Poll until some render satisfies `pred` or two seconds pass.
    pub async fn wait_for(&self, pred: impl Fn(&Snapshot) -> bool) -> bool {
        for _ in 0..200 {
            if self.seen.lock().unwrap().iter().any(&pred) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl DisplaySink for RecordingSink {
    fn render(&mut self, state: &DisplayState) {
        self.seen.lock().unwrap().push(Snapshot {
            phase: state.phase(),
            progress: state.progress(),
            frame: state.current_frame().map(|f| f.bytes().to_vec()),
            live_frames: state.ledger().live(),
        });
    }
}

/// A small fake MP4 on disk.
pub fn video_file(dir: &tempfile::TempDir, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut data = b"\x00\x00\x00\x18ftypmp42".to_vec();
    data.resize(len.max(data.len()), 0xAB);
    std::fs::write(&path, data).unwrap();
    path
}
