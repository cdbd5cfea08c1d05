//! FsOutputStore — step results as plain files on a shared volume.
//!
//! Layout: `<root>/<executionId>/<stepName>`
//!
//! Locators are the path relative to the root (`<executionId>/<stepName>`).
//! Task agents writing to the same share may report either the relative
//! form or an absolute path under the root; both resolve to the same file.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{EngineError, EngineResult, ErrorKind};

use super::OutputStore;

#[derive(Debug, Clone)]
pub struct FsOutputStore {
    root: PathBuf,
}

impl FsOutputStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a locator to a file below the root, rejecting anything that escapes it.
    pub fn resolve(&self, locator: &str) -> EngineResult<PathBuf> {
        let raw = Path::new(locator);
        let relative = match raw.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => Path::new(locator.trim_start_matches('/')),
        };

        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(EngineError::new(
                ErrorKind::OutputRead,
                format!("Invalid output locator '{}'", locator),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn segment<'a>(&self, value: &'a str, what: &str) -> EngineResult<&'a str> {
        if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
            return Err(EngineError::new(
                ErrorKind::OutputRead,
                format!("Invalid {} '{}' for output path", what, value),
            ));
        }
        Ok(value)
    }
}

#[async_trait]
impl OutputStore for FsOutputStore {
    async fn create_namespace(&self, execution_id: &str) -> EngineResult<()> {
        let dir = self.root.join(self.segment(execution_id, "execution id")?);
        fs::create_dir_all(&dir).await.map_err(|e| {
            EngineError::with_cause(
                ErrorKind::OutputRead,
                format!("Failed to create output namespace {}", dir.display()),
                e,
            )
        })?;
        tracing::debug!("[OutputStore] Namespace ready: {}", dir.display());
        Ok(())
    }

    async fn write(
        &self,
        execution_id: &str,
        step_name: &str,
        bytes: &[u8],
    ) -> EngineResult<String> {
        let exec = self.segment(execution_id, "execution id")?;
        let step = self.segment(step_name, "step name")?;
        let dir = self.root.join(exec);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(step), bytes).await.map_err(|e| {
            EngineError::with_cause(
                ErrorKind::OutputRead,
                format!("Failed to write output {}/{}", exec, step),
                e,
            )
        })?;
        Ok(format!("{}/{}", exec, step))
    }

    async fn read(&self, locator: &str) -> EngineResult<Vec<u8>> {
        let path = self.resolve(locator)?;
        fs::read(&path).await.map_err(|e| {
            let kind = if e.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::OutputRead
            };
            EngineError::with_cause(kind, format!("Failed to read output '{}'", locator), e)
        })
    }
}
