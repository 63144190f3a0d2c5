//! Agent package installation from console uploads.
//!
//! Each file is either already on this node (`local: true`) or carried
//! inline as a base64 data URL. Inline files are staged in a temporary
//! directory that is removed when the request completes, whatever the
//! outcome of the individual installs.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::control_client::ControlClient;
use crate::error::{ControlError, Result};

/// One file of an install request.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallFile {
    /// File name, or the full path for local files.
    pub file_name: String,
    /// Whether the file is already on this node.
    #[serde(default)]
    pub local: bool,
    /// Inline content as `data:<mime>;base64,<payload>`.
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstallRequest {
    files: Vec<Value>,
}

impl InstallFile {
    /// Parse one entry of the `files` list.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidParams` if the entry is not a file
    /// object.
    pub fn from_entry(entry: &Value) -> Result<Self> {
        Self::deserialize(entry)
            .map_err(|e| ControlError::InvalidParams(format!("invalid install entry: {e}")))
    }
}

/// Decode the payload of a base64 data URL.
///
/// # Errors
///
/// Returns `ControlError::InvalidParams` if there is no base64 marker or the
/// payload does not decode.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>> {
    let (_, payload) = data
        .split_once("base64,")
        .ok_or_else(|| ControlError::InvalidParams("file is not a base64 data url".to_string()))?;
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ControlError::InvalidParams(format!("invalid base64 payload: {e}")))
}

/// Installs agent packages through the control plane.
pub struct Installer {
    control: Arc<dyn ControlClient>,
}

impl Installer {
    /// Create an installer.
    #[must_use]
    pub fn new(control: Arc<dyn ControlClient>) -> Self {
        Self { control }
    }

    /// Install every file of a request. Returns one `{uuid}` or `{error}`
    /// entry per file, in request order.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidParams` if the request has no `files`
    /// list and `ControlError::Internal` if the staging directory cannot be
    /// created. Per-file failures are reported in the entries.
    pub async fn install(&self, params: &Value) -> Result<Vec<Value>> {
        let request: InstallRequest = serde_json::from_value(params.clone())
            .map_err(|e| ControlError::InvalidParams(format!("install requires files: {e}")))?;

        let staging = TempDir::new()
            .map_err(|e| ControlError::Internal(format!("cannot create staging dir: {e}")))?;

        let mut results = Vec::with_capacity(request.files.len());
        for (index, entry) in request.files.iter().enumerate() {
            let file = match InstallFile::from_entry(entry) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping malformed install entry");
                    results.push(json!({"error": e.to_string()}));
                    continue;
                }
            };
            let result = match self.install_one(staging.path(), &file).await {
                Ok(uuid) => {
                    tracing::info!(file = %file.file_name, uuid = %uuid, "Installed agent");
                    json!({"uuid": uuid})
                }
                Err(e) => {
                    tracing::warn!(file = %file.file_name, error = %e, "Agent install failed");
                    json!({"error": e.to_string()})
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    async fn install_one(&self, staging: &Path, file: &InstallFile) -> Result<String> {
        let path = if file.local {
            file.file_name.clone()
        } else {
            let data = file
                .file
                .as_deref()
                .ok_or_else(|| ControlError::InvalidParams("missing file contents".to_string()))?;
            let bytes = decode_data_url(data)?;

            let name = Path::new(&file.file_name)
                .file_name()
                .ok_or_else(|| {
                    ControlError::InvalidParams(format!("invalid file name: {}", file.file_name))
                })?;
            let path = staging.join(name);
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| ControlError::Internal(format!("cannot stage file: {e}")))?;
            path.to_string_lossy().into_owned()
        };

        self.control.install_agent_local(&path).await
    }
}
