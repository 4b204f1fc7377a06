use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConnectionError;

/// Environment variable that overrides `server_url`.
pub const SERVER_URL_ENV: &str = "VIDWATCH_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the processing server (http or https)
    pub server_url: String,
    /// Path of the multipart upload endpoint
    pub upload_path: String,
    /// Path of the WebSocket stream endpoint
    pub stream_path: String,
    /// Upper bound on a single upload request
    pub upload_timeout_secs: u64,
    /// Fail the session if the server goes quiet for this long.
    /// Unset means wait forever.
    pub stall_timeout_secs: Option<u64>,
    /// Media type prefix a file must carry to be uploaded
    pub accepted_media_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            upload_path: "/upload".to_string(),
            stream_path: "/ws".to_string(),
            upload_timeout_secs: 300,
            stall_timeout_secs: None,
            accepted_media_prefix: "video/".to_string(),
        }
    }
}

impl Config {
    /// Default location: `~/.vidwatch/config.toml`.
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".vidwatch").join("config.toml")
    }

    /// Load configuration from file, falling back to defaults when the file
    /// does not exist. `VIDWATCH_SERVER_URL` is applied afterwards.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            Config::default()
        };

        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                config.server_url = url;
            }
        }
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve an endpoint path under `server_url`, keeping any path prefix
    /// it carries (`http://host/api` + `/upload` is `http://host/api/upload`).
    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = Url::parse(&self.server_url)?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path.trim_start_matches('/'))
    }

    /// Full URL of the upload endpoint.
    pub fn upload_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint(&self.upload_path)
    }

    /// Full URL of the stream endpoint, with http(s) mapped to ws(s).
    pub fn stream_url(&self) -> Result<Url, ConnectionError> {
        let invalid = |e: String| ConnectionError::InvalidUrl(e);
        let mut url = self
            .endpoint(&self.stream_path)
            .map_err(|e| invalid(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot switch scheme to {scheme}")))?;
        Ok(url)
    }
}
