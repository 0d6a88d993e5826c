//! Scratch persistence: the playground's single saved script.
//!
//! One opaque string at a fixed location, the way a browser playground keeps
//! its buffer under a single storage key. Saving is fire-and-forget from the
//! trigger's perspective; failures are logged, never surfaced.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::config::loader::get_data_dir;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ScratchStore {
    path: PathBuf,
}

impl ScratchStore {
    /// Store under the platform data directory.
    pub fn new() -> Self {
        Self {
            path: get_data_dir().join("scratch.js"),
        }
    }

    /// Store at an explicit path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously saved script, if any.
    pub async fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "failed to read scratch script");
                None
            }
        }
    }

    /// Persist the current script.
    pub async fn save(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, text).await?;
        debug!(path = %self.path.display(), bytes = text.len(), "saved scratch script");
        Ok(())
    }

    /// Delete the saved script, if any.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ScratchStore {
    fn default() -> Self {
        Self::new()
    }
}
