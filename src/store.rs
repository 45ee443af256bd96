// 15.0: snapshot store. all live sessions serialize to a single JSON file,
// loaded once at startup and written on settlement plus a periodic timer.
// a missing file is an empty store, not an error.

use crate::portfolio::Portfolio;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<HashMap<String, Portfolio>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let sessions = serde_json::from_slice(&bytes)?;
                Ok(sessions)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    // write-then-rename so a crash mid-save never truncates the snapshot.
    pub async fn save(&self, sessions: &HashMap<String, Portfolio>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(sessions)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(sessions = sessions.len(), path = %self.path.display(), "snapshot saved");
        Ok(())
    }
}
