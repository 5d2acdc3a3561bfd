use serde::Deserialize;

use crate::embed;
use crate::error::{PacsError, Result};
use crate::metadata::{self, ArchiveStudy};
use crate::models::{InstanceId, PacsEndpoint, StudyId, StudyMetadata, SyncReport};
use crate::sync::{upsert_study, Destination, SendOptions};
use crate::transport::{get_json, SharedTransport};

/// Entry of `GET {base}/studies/{id}/instances`.
#[derive(Debug, Deserialize)]
struct InstanceDescriptor {
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

/// REST-backed access to a networked archive.
pub struct RemoteRepository {
    transport: SharedTransport,
    source: PacsEndpoint,
}

impl RemoteRepository {
    pub fn new(transport: SharedTransport, source: PacsEndpoint) -> Self {
        Self { transport, source }
    }

    pub fn source(&self) -> &PacsEndpoint {
        &self.source
    }

    pub fn list_studies(&self) -> Result<Vec<StudyId>> {
        let ids: Vec<String> = get_json(self.transport.as_ref(), &self.source, "studies")?;
        Ok(ids.into_iter().map(StudyId::Remote).collect())
    }

    pub fn study_metadata(&self, study_id: &str) -> Result<StudyMetadata> {
        let study: ArchiveStudy = get_json(
            self.transport.as_ref(),
            &self.source,
            &format!("studies/{study_id}"),
        )
        .map_err(|e| PacsError::from_transport(format!("could not load metadata of study {study_id}"), e))?;
        Ok(metadata::from_archive(&study))
    }

    pub fn study_instances(&self, study_id: &str) -> Result<Vec<InstanceId>> {
        let descriptors: Vec<InstanceDescriptor> = get_json(
            self.transport.as_ref(),
            &self.source,
            &format!("studies/{study_id}/instances"),
        )
        .map_err(|e| PacsError::from_transport(format!("could not list instances of study {study_id}"), e))?;

        Ok(descriptors
            .into_iter()
            .filter_map(|d| d.id)
            .map(InstanceId::Remote)
            .collect())
    }

    pub fn instance_bytes(&self, instance_id: &str) -> Result<Vec<u8>> {
        self.transport
            .get(&self.source, &format!("instances/{instance_id}/file"))
            .map_err(|e| PacsError::from_transport(format!("could not fetch DICOM file of instance {instance_id}"), e))
    }

    /// Embedded result of one instance, or "" when unavailable.
    pub fn instance_result(&self, instance_id: &str) -> String {
        match self.instance_bytes(instance_id) {
            Ok(bytes) => embed::extract_result(&bytes),
            Err(e) => {
                tracing::warn!(instance = %instance_id, error = %e, "could not read examination result");
                String::new()
            }
        }
    }

    /// First non-empty embedded result across the study's instances.
    pub fn study_result(&self, study_id: &str) -> String {
        let instances = match self.study_instances(study_id) {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(study = %study_id, error = %e, "could not read examination result");
                return String::new();
            }
        };
        instances
            .iter()
            .map(|instance| self.instance_result(instance.as_str()))
            .find(|result| !result.is_empty())
            .unwrap_or_default()
    }

    /// Copy a study to `destination`, replacing any study with the same UID there.
    pub fn send_study(
        &self,
        study_id: &str,
        destination: &PacsEndpoint,
        result: Option<&str>,
        anonymize: bool,
    ) -> Result<SyncReport> {
        let instances = self.study_instances(study_id)?;
        if instances.is_empty() {
            return Err(PacsError::data(format!("no instances found in study {study_id}")));
        }
        let meta = self.study_metadata(study_id)?;

        tracing::info!(
            study = %study_id,
            instances = instances.len(),
            destination = %destination.url,
            anonymize,
            "sending archive study"
        );

        let target = Destination::new(self.transport.as_ref(), destination);
        upsert_study(
            &target,
            StudyId::Remote(study_id.to_string()),
            meta.uid(),
            &instances,
            SendOptions { result, anonymize },
            |instance| self.instance_bytes(instance.as_str()),
        )
    }
}
