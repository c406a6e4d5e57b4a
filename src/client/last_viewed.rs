//! Remembers which photo the lightbox showed last, so the gallery can
//! scroll back to it once after the lightbox closes.

use serde::{Deserialize, Serialize};
use std::{io, path::Path};
use tokio::fs;
use tracing::debug;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LastViewedPhoto {
    idx: Option<usize>,
}

impl LastViewedPhoto {
    pub fn get(&self) -> Option<usize> {
        self.idx
    }

    pub fn remember(&mut self, idx: usize) {
        self.idx = Some(idx);
    }

    /// Return the remembered index and forget it.
    pub fn take(&mut self) -> Option<usize> {
        self.idx.take()
    }

    /// Load from client-local storage. A missing or unreadable file is an
    /// empty value.
    pub async fn load(path: &Path) -> Self {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                debug!(path = %path.display(), error = %err, "ignoring corrupt last-viewed state");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(self).map_err(io::Error::other)?;
        fs::write(path, bytes).await
    }
}
