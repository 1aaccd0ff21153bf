//! Runtime directory layout and the deployment manifest.
//!
//! `deploy_model` copies a model into `<runtime>/models/` and upserts its
//! record in `<runtime>/manifest.json`. The resolver only ever reads the
//! manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::BackendKind;
use crate::error::{EchoError, Result};

/// Backend names accepted by the deploy tool. `cpu` leaves the runtime choice
/// to the model file's extension.
pub const DEPLOY_BACKENDS: [&str; 4] = ["akida", "onnx", "tflite", "cpu"];

/// One deployed model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    /// File name inside the runtime models directory.
    pub name: String,
    pub backend: String,
    pub path: PathBuf,
    /// RFC 3339 UTC timestamp.
    pub deployed_at: String,
}

impl DeploymentRecord {
    /// Runtime kind for this record: the declared backend, or the file
    /// extension for `cpu` and unrecognized names.
    pub fn kind(&self) -> Option<BackendKind> {
        self.backend
            .parse::<BackendKind>()
            .ok()
            .filter(|kind| *kind != BackendKind::Dummy)
            .or_else(|| BackendKind::from_extension(&self.path))
    }
}

/// `model_id -> record`, one active entry per id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentManifest {
    #[serde(default)]
    pub models: BTreeMap<String, DeploymentRecord>,
}

impl DeploymentManifest {
    /// Read a manifest; a missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| EchoError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, model_id: &str) -> Option<&DeploymentRecord> {
        self.models.get(model_id)
    }

    /// Records of `kind` in model id order.
    pub fn records_for(&self, kind: BackendKind) -> impl Iterator<Item = &DeploymentRecord> {
        self.models
            .values()
            .filter(move |record| record.kind() == Some(kind))
    }
}

/// Copy `model_path` into `<runtime_dir>/models/` and record it under `model_id`.
pub fn deploy_model(
    model_id: &str,
    model_path: &Path,
    backend: &str,
    runtime_dir: &Path,
) -> anyhow::Result<DeploymentRecord> {
    if !model_path.is_file() {
        bail!("model file not found: {}", model_path.display());
    }
    if !DEPLOY_BACKENDS.contains(&backend) {
        bail!(
            "invalid backend: {} (valid backends: {})",
            backend,
            DEPLOY_BACKENDS.join(", ")
        );
    }

    let models_dir = runtime_dir.join("models");
    fs::create_dir_all(&models_dir)
        .with_context(|| format!("failed to create {}", models_dir.display()))?;

    let name = model_path
        .file_name()
        .context("model path has no file name")?
        .to_string_lossy()
        .into_owned();
    let dest = models_dir.join(&name);
    fs::copy(model_path, &dest)
        .with_context(|| format!("failed to copy model to {}", dest.display()))?;
    info!(
        id = model_id,
        src = %model_path.display(),
        dest = %dest.display(),
        %backend,
        "Model copied"
    );

    let manifest_path = runtime_dir.join("manifest.json");
    let mut manifest = DeploymentManifest::load(&manifest_path)?;
    let record = DeploymentRecord {
        id: model_id.to_string(),
        name,
        backend: backend.to_string(),
        path: dest,
        deployed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    manifest.models.insert(model_id.to_string(), record.clone());
    manifest.save(&manifest_path)?;
    info!(manifest = %manifest_path.display(), "Manifest updated");

    Ok(record)
}
