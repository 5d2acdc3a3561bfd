//
// sync.rs
// PACS-Sync
//
// Destination-side upsert protocol (find by Study Instance UID, delete, recreate) and queue sends across both repositories.
//
// Thales Matheus Mendonça Santos - October 2026

use crate::anonymize;
use crate::embed;
use crate::error::{PacsError, Result, TransportError};
use crate::metadata::ArchiveStudy;
use crate::models::{BatchReport, InstanceId, PacsEndpoint, QueuedStudy, StudyId, SyncReport};
use crate::router::HybridRouter;
use crate::transport::{get_json, Transport, DICOM_CONTENT_TYPE};

/// Archive receiving synchronized studies.
pub struct Destination<'a> {
    transport: &'a dyn Transport,
    endpoint: &'a PacsEndpoint,
}

impl<'a> Destination<'a> {
    pub fn new(transport: &'a dyn Transport, endpoint: &'a PacsEndpoint) -> Self {
        Self { transport, endpoint }
    }

    /// Linear scan of every destination study until one carries `uid`.
    ///
    /// The archive offers no lookup by UID, so this costs one metadata request per
    /// destination study. Unreadable studies are skipped; a failed listing counts as
    /// "not present".
    pub fn find_study_by_uid(&self, uid: &str) -> Option<String> {
        let ids: Vec<String> = match get_json(self.transport, self.endpoint, "studies") {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(url = %self.endpoint.url, error = %e, "could not list destination studies");
                return None;
            }
        };

        for id in ids {
            match get_json::<ArchiveStudy>(self.transport, self.endpoint, &format!("studies/{id}")) {
                Ok(study) if study.study_instance_uid() == Some(uid) => return Some(id),
                Ok(_) => {}
                Err(e) => tracing::debug!(study = %id, error = %e, "skipping unreadable destination study"),
            }
        }
        None
    }

    pub fn delete_study(&self, id: &str) -> Result<(), TransportError> {
        self.transport.delete(self.endpoint, &format!("studies/{id}"))
    }

    pub fn store_instance(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.transport
            .post(self.endpoint, "instances", payload, DICOM_CONTENT_TYPE)
            .map(|_| ())
    }
}

/// How each instance is rewritten before upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions<'a> {
    pub result: Option<&'a str>,
    pub anonymize: bool,
}

impl SendOptions<'_> {
    pub fn prepare(&self, payload: Vec<u8>) -> Vec<u8> {
        let payload = if self.anonymize {
            anonymize::anonymize(&payload)
        } else {
            payload
        };
        match self.result.filter(|r| !r.is_empty()) {
            Some(result) => embed::embed_result(&payload, result),
            None => payload,
        }
    }
}

/// Replace (or create) a study at the destination.
///
/// When a destination study shares `uid` it is deleted first; if that delete fails
/// nothing is uploaded. Instances are then sent one by one and each outcome is
/// recorded. Already-stored instances stay in place when later ones fail.
pub fn upsert_study<F>(
    destination: &Destination<'_>,
    study: StudyId,
    uid: Option<&str>,
    instances: &[InstanceId],
    options: SendOptions<'_>,
    mut load: F,
) -> Result<SyncReport>
where
    F: FnMut(&InstanceId) -> Result<Vec<u8>>,
{
    let mut report = SyncReport::new(study);

    match uid {
        Some(uid) => {
            if let Some(existing) = destination.find_study_by_uid(uid) {
                tracing::info!(study = %report.study, existing = %existing, "study already at destination, replacing");
                destination
                    .delete_study(&existing)
                    .map_err(|e| PacsError::ReplaceAborted {
                        existing: existing.clone(),
                        reason: e.to_string(),
                    })?;
                report.replaced = Some(existing);
            }
        }
        None => tracing::warn!(study = %report.study, "no Study Instance UID, skipping destination lookup"),
    }

    for instance in instances {
        let outcome = load(instance).and_then(|payload| {
            destination
                .store_instance(options.prepare(payload))
                .map_err(|e| PacsError::from_transport(format!("could not store instance {instance}"), e))
        });
        match outcome {
            Ok(()) => report.succeeded.push(instance.clone()),
            Err(e) => {
                tracing::warn!(study = %report.study, instance = %instance, error = %e, "instance not stored");
                report.failed.push((instance.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        study = %report.study,
        sent = report.succeeded.len(),
        failed = report.failed.len(),
        "study synchronization finished"
    );
    Ok(report)
}

/// Top-level sender for one or many studies, whatever repository they live in.
pub struct SyncEngine {
    router: HybridRouter,
}

impl SyncEngine {
    pub fn new(router: HybridRouter) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &HybridRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut HybridRouter {
        &mut self.router
    }

    pub fn sync_study(
        &self,
        study: &StudyId,
        destination: &PacsEndpoint,
        result: Option<&str>,
        anonymize: bool,
    ) -> Result<SyncReport> {
        self.router.send_study(study, destination, result, anonymize)
    }

    /// Send every queued study in order; one failure never stops the batch.
    pub fn send_queue(
        &self,
        queue: &[QueuedStudy],
        destination: &PacsEndpoint,
        anonymize_remote: bool,
    ) -> BatchReport {
        let mut batch = BatchReport::default();

        for queued in queue {
            let study = queued.study_id();
            let result = queued.effective_result();
            if result.is_some() {
                batch.with_result += 1;
            }
            if study.is_local() {
                batch.local += 1;
            } else {
                batch.remote += 1;
            }

            match self.sync_study(&study, destination, result, anonymize_remote) {
                Ok(report) if report.is_success() => batch.succeeded.push(report),
                Ok(report) => {
                    let reason = match report.failed.first() {
                        Some((instance, why)) => format!(
                            "{}/{} instances failed (first: {instance}: {why})",
                            report.failed.len(),
                            report.total()
                        ),
                        None => "instances failed".to_string(),
                    };
                    batch.failed.push((study, reason));
                }
                Err(e) => batch.failed.push((study, e.to_string())),
            }
        }

        tracing::info!(
            total = batch.total(),
            succeeded = batch.succeeded.len(),
            failed = batch.failed.len(),
            "queue send finished"
        );
        batch
    }
}
