//! Environment configuration.
//!
//! Variables: `mail`/`passwd` or `authSubToken`/`gsfId` for login,
//! `catalogUrl`, and optionally `persistDir`, `logFile`, `handlesFile`,
//! `lastUpdatesFile`.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracker_engine::{Credentials, TrackerSettings};

const DEFAULT_PERSIST_DIR: &str = "persist";
const DEFAULT_LOG_FILE: &str = "updateTracking.log";
const DEFAULT_HANDLES_FILE: &str = "handles.json";
const DEFAULT_STATE_FILE: &str = "lastUpdates.json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub persist_dir: PathBuf,
    pub log_file: String,
    pub handles_file: String,
    pub state_file: String,
    pub catalog_url: String,
    pub credentials: Credentials,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let credentials = match (
            lookup("mail"),
            lookup("passwd"),
            lookup("authSubToken"),
            lookup("gsfId"),
        ) {
            (Some(email), Some(password), _, _) => Credentials::Password { email, password },
            (_, _, Some(auth_token), Some(device_id)) => {
                device_id
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("gsfId must be numeric, got {device_id:?}"))?;
                Credentials::Token {
                    auth_token,
                    device_id: device_id.trim().to_string(),
                }
            }
            _ => bail!("set either `mail` and `passwd`, or `authSubToken` and `gsfId`"),
        };
        let catalog_url = lookup("catalogUrl").context("`catalogUrl` is not set")?;

        Ok(Self {
            persist_dir: lookup("persistDir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PERSIST_DIR)),
            log_file: lookup("logFile").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
            handles_file: lookup("handlesFile").unwrap_or_else(|| DEFAULT_HANDLES_FILE.to_string()),
            state_file: lookup("lastUpdatesFile").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            catalog_url,
            credentials,
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.persist_dir.join(&self.log_file)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        let mut settings = TrackerSettings::in_dir(&self.persist_dir);
        settings.handles_path = self.persist_dir.join(&self.handles_file);
        settings.state_path = self.persist_dir.join(&self.state_file);
        settings
    }
}
