//
// local.rs
// PACS-Sync
//
// Filesystem-backed repository: loads DICOM files and folders into a persisted index and sends them with the same upsert protocol as archive studies.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use dicom::dictionary_std::tags;
use sha2::{Digest, Sha256};

use crate::batch;
use crate::dicom_access::ElementAccess;
use crate::embed;
use crate::error::{PacsError, Result};
use crate::metadata;
use crate::models::{
    FolderReport, InstanceId, LoadedFile, LoadedStudy, LocalInstance, PacsEndpoint, StudyId,
    StudyMetadata, SyncReport, LOCAL_PREFIX, NOT_AVAILABLE,
};
use crate::storage::{IndexStore, LocalIndex};
use crate::sync::{upsert_study, Destination, SendOptions};
use crate::transport::SharedTransport;

/// Namespaced identifier derived from a UID (or any stable key).
pub fn local_id(key: &str) -> String {
    let hash = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{}{}", LOCAL_PREFIX, &hash[..12])
}

pub struct LocalRepository {
    store: IndexStore,
    index: LocalIndex,
    transport: SharedTransport,
}

impl LocalRepository {
    /// Open (or create) the cache directory and reload its index.
    pub fn open(cache_dir: impl AsRef<Path>, transport: SharedTransport) -> Result<Self> {
        let store = IndexStore::new(cache_dir)?;
        let index = store.load();
        Ok(Self {
            store,
            index,
            transport,
        })
    }

    pub fn index(&self) -> &LocalIndex {
        &self.index
    }

    fn persist(&mut self) -> Result<()> {
        self.store.save(&mut self.index)
    }

    // Merge one file into the index without persisting.
    fn ingest(&mut self, path: &Path) -> Result<LoadedFile> {
        if !path.exists() {
            return Err(PacsError::data(format!("file not found: {}", path.display())));
        }
        let obj = dicom::object::open_file(path)
            .map_err(|e| PacsError::data(format!("could not read DICOM file {}: {e}", path.display())))?;

        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let path_key = path.display().to_string();
        let uid_or_path = |tag| {
            obj.element_str(tag)
                .filter(|uid| !uid.is_empty())
                .unwrap_or_else(|| path_key.clone())
        };

        let study_id = local_id(&uid_or_path(tags::STUDY_INSTANCE_UID));
        let sop_instance_uid = uid_or_path(tags::SOP_INSTANCE_UID);
        let instance_id = local_id(&sop_instance_uid);
        let meta = metadata::from_dataset(&obj);

        let record = LocalInstance {
            id: instance_id.clone(),
            study_id: study_id.clone(),
            file_path: path.clone(),
            sop_instance_uid,
            series_instance_uid: obj
                .element_str(tags::SERIES_INSTANCE_UID)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            instance_number: obj
                .element_str(tags::INSTANCE_NUMBER)
                .unwrap_or_else(|| "1".to_string()),
        };

        self.index.studies.insert(study_id.clone(), meta.clone());
        self.index.instance_files.insert(instance_id.clone(), path);
        let instances = self.index.study_instances.entry(study_id.clone()).or_default();
        if !instances.iter().any(|i| i.id == instance_id) {
            instances.push(record);
        }

        Ok(LoadedFile {
            study: StudyId::Local(study_id),
            instance: InstanceId::Local(instance_id),
            metadata: meta,
        })
    }

    /// Load one file; loading the same file again does not duplicate its instance.
    pub fn load_file(&mut self, path: &Path) -> Result<LoadedFile> {
        let loaded = self.ingest(path)?;
        self.persist()?;
        tracing::info!(study = %loaded.study, instance = %loaded.instance, "local file loaded");
        Ok(loaded)
    }

    /// Recursively load every DICOM file below `folder`; unreadable files are reported, not fatal.
    pub fn load_folder(&mut self, folder: &Path) -> Result<FolderReport> {
        if !folder.is_dir() {
            return Err(PacsError::data(format!("folder not found: {}", folder.display())));
        }

        let mut report = FolderReport::default();
        let mut positions: HashMap<StudyId, usize> = HashMap::new();

        for path in batch::discover_dicom_files(folder) {
            match self.ingest(&path) {
                Ok(loaded) => {
                    let slot = *positions.entry(loaded.study.clone()).or_insert_with(|| {
                        report.studies.push(LoadedStudy {
                            study: loaded.study.clone(),
                            metadata: loaded.metadata.clone(),
                            file_count: 0,
                        });
                        report.studies.len() - 1
                    });
                    report.studies[slot].file_count += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping file");
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        self.persist()?;
        tracing::info!(
            folder = %folder.display(),
            studies = report.studies.len(),
            files = report.loaded_files(),
            failed = report.failed.len(),
            "local folder loaded"
        );
        Ok(report)
    }

    pub fn study_ids(&self) -> Vec<StudyId> {
        self.index
            .studies
            .keys()
            .cloned()
            .map(StudyId::Local)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.studies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.studies.is_empty()
    }

    pub fn study_metadata(&self, study_id: &str) -> Result<StudyMetadata> {
        self.index
            .studies
            .get(study_id)
            .cloned()
            .ok_or_else(|| PacsError::data(format!("local study {study_id} not found")))
    }

    pub fn instance_records(&self, study_id: &str) -> &[LocalInstance] {
        self.index
            .study_instances
            .get(study_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn study_instances(&self, study_id: &str) -> Vec<InstanceId> {
        self.instance_records(study_id)
            .iter()
            .map(|i| InstanceId::Local(i.id.clone()))
            .collect()
    }

    pub fn instance_bytes(&self, instance_id: &str) -> Result<Vec<u8>> {
        let path = self
            .index
            .instance_files
            .get(instance_id)
            .filter(|p| p.exists())
            .ok_or_else(|| PacsError::data(format!("local DICOM file not found for instance {instance_id}")))?;
        fs::read(path).map_err(|source| PacsError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn set_result(&mut self, study_id: &str, result: &str) -> Result<()> {
        if !self.index.studies.contains_key(study_id) {
            return Err(PacsError::data(format!("local study {study_id} not found")));
        }
        self.index
            .study_results
            .insert(study_id.to_string(), result.to_string());
        self.persist()
    }

    pub fn result(&self, study_id: &str) -> String {
        self.index
            .study_results
            .get(study_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Result embedded in the instance file, falling back to the owning study's cached result.
    pub fn instance_result(&self, instance_id: &str) -> String {
        let embedded = match self.instance_bytes(instance_id) {
            Ok(bytes) => embed::extract_result(&bytes),
            Err(e) => {
                tracing::debug!(instance = %instance_id, error = %e, "falling back to cached result");
                String::new()
            }
        };
        if !embedded.is_empty() {
            return embedded;
        }
        self.index
            .study_of_instance(instance_id)
            .map(|study| self.result(study))
            .unwrap_or_default()
    }

    pub fn remove_study(&mut self, study_id: &str) -> Result<bool> {
        let existed = self.index.studies.remove(study_id).is_some();
        if let Some(instances) = self.index.study_instances.remove(study_id) {
            for instance in instances {
                self.index.instance_files.remove(&instance.id);
            }
        }
        self.index.study_results.remove(study_id);
        self.persist()?;
        Ok(existed)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.index.clear();
        self.persist()
    }

    /// Send a disk-origin study, always anonymized, replacing any same-UID study at `destination`.
    pub fn send_local_study_to_pacs(
        &self,
        study_id: &str,
        destination: &PacsEndpoint,
        result: Option<&str>,
    ) -> Result<SyncReport> {
        let meta = self.study_metadata(study_id)?;
        let instances = self.study_instances(study_id);
        if instances.is_empty() {
            return Err(PacsError::data(format!("no instances found in local study {study_id}")));
        }

        tracing::info!(
            study = %study_id,
            instances = instances.len(),
            destination = %destination.url,
            "sending local study"
        );

        let target = Destination::new(self.transport.as_ref(), destination);
        upsert_study(
            &target,
            StudyId::Local(study_id.to_string()),
            meta.uid(),
            &instances,
            SendOptions {
                result,
                anonymize: true,
            },
            |instance| self.instance_bytes(instance.as_str()),
        )
    }
}
