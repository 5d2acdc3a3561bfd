//
// storage.rs
// PACS-Sync
//
// Persists the local repository index (studies, instances, file paths, results) as a JSON side-file in the cache directory.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PacsError, Result};
use crate::models::{LocalInstance, StudyMetadata};

pub const INDEX_FILE_NAME: &str = "local_studies_cache.json";

/// In-memory view of the local cache. Unversioned; unknown keys are ignored on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalIndex {
    #[serde(default)]
    pub studies: BTreeMap<String, StudyMetadata>,
    #[serde(default)]
    pub study_instances: BTreeMap<String, Vec<LocalInstance>>,
    #[serde(default)]
    pub instance_files: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub study_results: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl LocalIndex {
    pub fn clear(&mut self) {
        self.studies.clear();
        self.study_instances.clear();
        self.instance_files.clear();
        self.study_results.clear();
    }

    /// Owning study of an instance, by scanning the per-study lists.
    pub fn study_of_instance(&self, instance_id: &str) -> Option<&str> {
        self.study_instances
            .iter()
            .find(|(_, instances)| instances.iter().any(|i| i.id == instance_id))
            .map(|(study, _)| study.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        // Create the cache directory eagerly so the first save cannot fail on it.
        fs::create_dir_all(&root).map_err(|source| PacsError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    /// Reload the index; a missing or unreadable file starts an empty one.
    pub fn load(&self) -> LocalIndex {
        let path = self.path();
        if !path.exists() {
            return LocalIndex::default();
        }

        let parsed = fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<LocalIndex>(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(index) => {
                tracing::debug!(path = %path.display(), studies = index.studies.len(), "local index loaded");
                index
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not load local index, starting empty");
                LocalIndex::default()
            }
        }
    }

    pub fn save(&self, index: &mut LocalIndex) -> Result<()> {
        index.last_updated = Some(Utc::now());
        let json = serde_json::to_vec_pretty(index)
            .map_err(|e| PacsError::Index(format!("failed to serialize local index: {e}")))?;

        // Write beside the target then rename, so a crash never leaves half a file.
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| PacsError::Index(format!("failed to write {}: {e}", path.display())))
    }
}
