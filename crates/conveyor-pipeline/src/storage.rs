//! Shared storage for staged artifacts and execution results
//!
//! Layout under the data root, one directory per job:
//!
//! ```text
//! <data_root>/<job_id>/Dockerfile   staged by the gateway, read by the builder
//! <data_root>/<job_id>/perf.json    written by the executed image
//! ```

use std::path::PathBuf;

use tracing::debug;

use crate::job::JobId;
use crate::Error;

/// File name of the staged artifact
pub const ARTIFACT_FILE: &str = "Dockerfile";
/// File name of the result written by the executed image
pub const RESULT_FILE: &str = "perf.json";
/// Field of the result file holding the reported performance
pub const RESULT_FIELD: &str = "perf";

/// Per-job directories on the shared volume
#[derive(Clone, Debug)]
pub struct JobStorage {
    root: PathBuf,
}

impl JobStorage {
    /// Storage rooted at the local mount of the shared volume
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of one job
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Write the uploaded artifact where the build stage expects it
    pub async fn stage_artifact(&self, id: &JobId, content: &[u8]) -> Result<PathBuf, Error> {
        let dir = self.job_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::Storage {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(ARTIFACT_FILE);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| Error::Storage {
                path: path.clone(),
                source,
            })?;

        debug!(job_id = %id, path = %path.display(), bytes = content.len(), "artifact staged");
        Ok(path)
    }

    /// Read the executed image's result file and extract its `perf` field
    pub async fn read_result(&self, id: &JobId) -> Result<serde_json::Value, Error> {
        let path = self.job_dir(id).join(RESULT_FILE);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| Error::Storage {
                path: path.clone(),
                source,
            })?;

        parse_result(&raw).map_err(|message| Error::ResultFile { path, message })
    }
}

/// Extract the `perf` field from result file contents
fn parse_result(raw: &[u8]) -> Result<serde_json::Value, String> {
    let mut value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| format!("malformed JSON: {}", e))?;
    let perf = value
        .get_mut(RESULT_FIELD)
        .map(serde_json::Value::take)
        .filter(|perf| !perf.is_null());
    perf.ok_or_else(|| format!("missing '{}' field", RESULT_FIELD))
}
