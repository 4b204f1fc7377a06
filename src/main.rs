use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use vidwatch::config::{Config, SERVER_URL_ENV};
use vidwatch::display::{DisplaySink, DisplayState};
use vidwatch::logging::{self, LogConfig};
use vidwatch::theme as t;
use vidwatch::transfer::UploadRequest;
use vidwatch::{Client, RunOutcome};

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "vidwatch",
    version,
    about = "Upload a video and watch the server process it"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Video file to upload
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
    /// Processing server base URL
    #[arg(long, env = SERVER_URL_ENV, value_name = "URL")]
    server: Option<String>,
    /// Config file (default: ~/.vidwatch/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Write the most recent frame to DIR/latest.jpg
    #[arg(long, value_name = "DIR")]
    frames_dir: Option<PathBuf>,
    /// Give up if the server sends nothing for this many seconds
    #[arg(long, value_name = "SECS")]
    stall_timeout: Option<u64>,
    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
    /// Verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

// ── Terminal sink ───────────────────────────────────────────────────────────

struct TerminalSink {
    bar: ProgressBar,
    frames: Option<mpsc::UnboundedSender<Bytes>>,
    last_frame: u64,
}

impl DisplaySink for TerminalSink {
    fn render(&mut self, state: &DisplayState) {
        self.bar.set_message(state.phase().to_string());
        self.bar.set_position(u64::from(state.progress()));

        let (Some(frames), Some(frame)) = (&self.frames, state.current_frame()) else {
            return;
        };
        if frame.seq() == self.last_frame {
            return;
        }
        self.last_frame = frame.seq();
        let _ = frames.send(frame.payload());
    }
}

/// Write frames to `dir/latest.jpg` off the render path. Frames that queue
/// up while a write is in flight are skipped in favour of the newest one.
/// Ends once every sender is gone and the last frame is on disk.
async fn write_frames(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    let path = dir.join("latest.jpg");
    while let Some(mut frame) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            frame = newer;
        }
        if let Err(e) = tokio::fs::write(&path, &frame).await {
            warn!(path = %path.display(), error = %e, "failed to write frame");
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    t::init_color(cli.no_color);
    logging::init(if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::from_env()
    });

    let mut config = Config::load(cli.config.clone())?;
    if let Some(url) = cli.server {
        config.server_url = url;
    }
    if let Some(secs) = cli.stall_timeout {
        config.stall_timeout_secs = Some(secs);
    }

    if let Some(Commands::Config { json }) = cli.command {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let request = match &cli.file {
        Some(path) => Some(
            UploadRequest::from_path(path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?,
        ),
        None => None,
    };
    if let Some(dir) = &cli.frames_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    println!("{}", t::label_value("Server", &config.server_url));
    if let Some(req) = &request {
        println!("{}", t::label_value("File", &req.file_name));
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let (frames, writer) = match cli.frames_dir {
        Some(dir) => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(tokio::spawn(write_frames(dir, rx))))
        }
        None => (None, None),
    };

    let bar = t::progress_bar();
    let sink = TerminalSink {
        bar: bar.clone(),
        frames,
        last_frame: 0,
    };
    let mut client = Client::from_config(config, Box::new(sink))?;
    let result = client.run(request, cancel).await;
    let frames_received = client.state().frames_received();

    // Dropping the client drops the sink's sender, letting the writer drain.
    drop(client);
    if let Some(writer) = writer {
        if let Err(e) = writer.await {
            warn!(error = %e, "frame writer task failed");
        }
    }

    match result {
        Ok(RunOutcome::Completed { file_ref }) => {
            bar.finish_and_clear();
            println!(
                "{}",
                t::icon_ok(&format!(
                    "Processing complete: {file_ref} ({frames_received} frames)"
                ))
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(RunOutcome::Cancelled) => {
            bar.abandon();
            println!("{}", t::icon_warn("Cancelled"));
            Ok(ExitCode::from(130))
        }
        Err(e) => {
            bar.abandon();
            eprintln!("{}", t::icon_fail(&e.to_string()));
            Ok(ExitCode::FAILURE)
        }
    }
}
