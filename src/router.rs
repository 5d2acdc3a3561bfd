use std::path::Path;

use crate::error::Result;
use crate::local::LocalRepository;
use crate::models::{
    FolderReport, InstanceId, LoadedFile, PacsEndpoint, StudyId, StudyMetadata, SyncReport,
};
use crate::remote::RemoteRepository;

/// Dispatches each call to the repository owning the identifier.
pub struct HybridRouter {
    remote: RemoteRepository,
    local: LocalRepository,
}

impl HybridRouter {
    pub fn new(remote: RemoteRepository, local: LocalRepository) -> Self {
        Self { remote, local }
    }

    pub fn remote(&self) -> &RemoteRepository {
        &self.remote
    }

    pub fn local(&self) -> &LocalRepository {
        &self.local
    }

    /// Archive studies followed by local ones; an unreachable archive contributes nothing.
    pub fn get_all_studies(&self) -> Vec<StudyId> {
        let mut studies = match self.remote.list_studies() {
            Ok(studies) => studies,
            Err(e) => {
                tracing::warn!(error = %e, "could not load archive studies");
                Vec::new()
            }
        };
        studies.extend(self.local.study_ids());
        studies
    }

    pub fn get_study_metadata(&self, study: &StudyId) -> Result<StudyMetadata> {
        match study {
            StudyId::Local(id) => self.local.study_metadata(id),
            StudyId::Remote(id) => self.remote.study_metadata(id),
        }
    }

    pub fn get_study_instances(&self, study: &StudyId) -> Result<Vec<InstanceId>> {
        match study {
            StudyId::Local(id) => Ok(self.local.study_instances(id)),
            StudyId::Remote(id) => self.remote.study_instances(id),
        }
    }

    pub fn get_dicom_file(&self, instance: &InstanceId) -> Result<Vec<u8>> {
        match instance {
            InstanceId::Local(id) => self.local.instance_bytes(id),
            InstanceId::Remote(id) => self.remote.instance_bytes(id),
        }
    }

    /// Local studies are always anonymized; archive studies only when asked.
    pub fn send_study(
        &self,
        study: &StudyId,
        destination: &PacsEndpoint,
        result: Option<&str>,
        anonymize: bool,
    ) -> Result<SyncReport> {
        match study {
            StudyId::Local(id) => self.local.send_local_study_to_pacs(id, destination, result),
            StudyId::Remote(id) => self.remote.send_study(id, destination, result, anonymize),
        }
    }

    pub fn get_instance_result(&self, instance: &InstanceId) -> String {
        match instance {
            InstanceId::Local(id) => self.local.instance_result(id),
            InstanceId::Remote(id) => self.remote.instance_result(id),
        }
    }

    pub fn get_study_result(&self, study: &StudyId) -> String {
        match study {
            StudyId::Local(id) => self.local.result(id),
            StudyId::Remote(id) => self.remote.study_result(id),
        }
    }

    /// Cache a result for a local study. Archive studies only carry results inside their payloads.
    pub fn set_study_result(&mut self, study: &StudyId, result: &str) -> Result<bool> {
        match study {
            StudyId::Local(id) => self.local.set_result(id, result).map(|_| true),
            StudyId::Remote(_) => Ok(false),
        }
    }

    pub fn load_local_file(&mut self, path: &Path) -> Result<LoadedFile> {
        self.local.load_file(path)
    }

    pub fn load_local_folder(&mut self, folder: &Path) -> Result<FolderReport> {
        self.local.load_folder(folder)
    }

    pub fn remove_local_study(&mut self, study: &StudyId) -> Result<bool> {
        match study {
            StudyId::Local(id) => self.local.remove_study(id),
            StudyId::Remote(_) => Ok(false),
        }
    }

    pub fn clear_local_studies(&mut self) -> Result<()> {
        self.local.clear()
    }

    pub fn local_study_count(&self) -> usize {
        self.local.len()
    }
}
