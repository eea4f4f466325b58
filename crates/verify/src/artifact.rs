//! Screenshot artifacts

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{VerifyError, VerifyResult};

/// A screenshot written by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

impl ScreenshotArtifact {
    /// Read back a screenshot the browser just wrote. An empty or missing file
    /// means the capture did not happen.
    pub fn inspect(path: &Path) -> VerifyResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            VerifyError::Driver(format!("screenshot {} was not written: {}", path.display(), e))
        })?;
        if data.is_empty() {
            return Err(VerifyError::Driver(format!(
                "screenshot {} is empty",
                path.display()
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(&data);

        Ok(Self {
            path: path.to_path_buf(),
            bytes: data.len() as u64,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Create the parent directory of an output file.
pub fn ensure_parent_dir(path: &Path) -> VerifyResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
