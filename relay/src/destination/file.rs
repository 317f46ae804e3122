//! File destination - stores every message as a pretty-printed JSON file.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::FileConfig;
use crate::destination::Destination;
use crate::error::DeliveryError;
use crate::message::Message;

const NAME: &str = "file";

/// Writes `received_email_<secs>_<nanos>.json` into the configured directory.
pub struct FileDestination {
    config: FileConfig,
}

impl FileDestination {
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    /// Path for a message stored at `now`.
    fn file_path(&self, now: SystemTime) -> PathBuf {
        let elapsed = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        self.config.dir_path.join(format!(
            "received_email_{}_{:09}.json",
            elapsed.as_secs(),
            elapsed.subsec_nanos()
        ))
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn name(&self) -> &str {
        NAME
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        if !self.config.enabled {
            debug!(destination = NAME, "destination_disabled");
            return Ok(());
        }

        let dir = &self.config.dir_path;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| DeliveryError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = self.file_path(SystemTime::now());
        let json = serde_json::to_vec_pretty(message)?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|source| DeliveryError::Io {
                path: path.clone(),
                source,
            })?;

        info!(destination = NAME, path = %path.display(), "message_stored");
        Ok(())
    }
}
