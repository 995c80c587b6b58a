//! Atomic JSON state files.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::Result;

/// A typed JSON file holding one monitor's state.
#[derive(Debug, Clone)]
pub struct StateStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or the default when the file does not exist.
    ///
    /// A file that cannot be parsed is set aside as `<name>.corrupt` and the
    /// monitor starts from the default state.
    pub async fn load(&self) -> Result<T> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                return Ok(T::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                let aside = self.path.with_extension("corrupt");
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "unreadable state file, moving it aside"
                );
                tokio::fs::rename(&self.path, &aside).await?;
                Ok(T::default())
            }
        }
    }

    /// Write the whole state: temp file first, then rename over the target.
    pub async fn save(&self, state: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}
