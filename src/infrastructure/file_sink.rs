//! File-backed save hook used by the CLI.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::application::{SaveError, SaveFuture, SaveHook};
use crate::infrastructure::error::{InfraError, InfraResult};

/// Writes each dump to `path`, replacing the previous one atomically.
#[derive(Debug, Clone)]
pub struct FileDumpSink {
    path: PathBuf,
}

impl FileDumpSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    #[instrument(level = "debug", skip(self, dump), fields(path = %self.path.display(), bytes = dump.len()))]
    async fn write(&self, dump: String) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, dump).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("dump written");
        Ok(())
    }
}

impl SaveHook for FileDumpSink {
    fn save(&self, dump: String) -> SaveFuture {
        let sink = self.clone();
        Box::pin(async move {
            sink.write(dump)
                .await
                .map_err(|e| SaveError::from(format!("write {}: {}", sink.path.display(), e)))
        })
    }
}

/// Read a previously saved dump; `None` if the file does not exist.
pub fn read_dump(path: &Path) -> InfraResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(dump) => Ok(Some(dump)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(InfraError::io(format!("read {}", path.display()), e)),
    }
}
