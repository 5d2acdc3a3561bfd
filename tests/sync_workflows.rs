//
// sync_workflows.rs
// PACS-Sync
//
// Integration-style tests driving the router and sync engine against an in-memory archive: upsert safety, partial failures, namespaces, local cache persistence, queue accounting and result fallbacks.
//
// Thales Matheus Mendonça Santos - October 2026

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::{FileDicomObject, FileMetaTableBuilder};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use pacs_sync::dicom_access::{read_object, write_object, ElementAccess};
use pacs_sync::local::LocalRepository;
use pacs_sync::models::QueuedStudy;
use pacs_sync::remote::RemoteRepository;
use pacs_sync::transport::{SharedTransport, Transport};
use pacs_sync::{embed, HybridRouter, InstanceId, PacsEndpoint, PacsError, StudyId, SyncEngine, TransportError};
use serde_json::json;
use tempfile::{tempdir, TempDir};

const SOURCE_URL: &str = "http://source.test";
const DEST_URL: &str = "http://dest.test";

fn build_test_dicom(study_uid: &str, sop_uid: &str) -> Vec<u8> {
    // Tiny Secondary Capture instance carrying identifying patient data.
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
        .media_storage_sop_instance_uid(sop_uid)
        .build()
        .expect("meta");
    let mut obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);

    let elements: [(Tag, VR, &str); 10] = [
        (tags::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.7"),
        (tags::SOP_INSTANCE_UID, VR::UI, sop_uid),
        (tags::STUDY_INSTANCE_UID, VR::UI, study_uid),
        (tags::PATIENT_NAME, VR::PN, "Test^Patient"),
        (tags::PATIENT_ID, VR::LO, "PAT123"),
        (tags::PATIENT_BIRTH_DATE, VR::DA, "19700101"),
        (tags::PATIENT_ADDRESS, VR::LO, "1 Main Street"),
        (tags::STUDY_DATE, VR::DA, "20240101"),
        (tags::STUDY_DESCRIPTION, VR::LO, "CT ABDOMEN"),
        (tags::MODALITY, VR::CS, "OT"),
    ];
    for (tag, vr, value) in elements {
        obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PrimitiveValue::from(vec![0_u8, 64, 128, 255]),
    ));
    write_object(&obj).expect("encode")
}

#[derive(Default)]
struct StoredStudy {
    uid: String,
    instances: Vec<String>,
}

#[derive(Default)]
struct Archive {
    studies: BTreeMap<String, StoredStudy>,
    files: HashMap<String, Vec<u8>>,
    next_id: usize,
    posts: usize,
    fail_listing: bool,
    fail_delete: bool,
    fail_post_number: Option<usize>,
}

impl Archive {
    fn mint(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{:04}", self.next_id)
    }

    fn store(&mut self, body: &[u8]) -> Result<(), TransportError> {
        let obj = read_object(body).map_err(|_| TransportError::BadRequest)?;
        let uid = obj
            .element_str(tags::STUDY_INSTANCE_UID)
            .ok_or(TransportError::BadRequest)?;

        let existing = self
            .studies
            .iter()
            .find(|(_, s)| s.uid == uid)
            .map(|(id, _)| id.clone());
        let study_id = match existing {
            Some(id) => id,
            None => {
                let id = self.mint("study");
                self.studies.insert(
                    id.clone(),
                    StoredStudy {
                        uid,
                        instances: Vec::new(),
                    },
                );
                id
            }
        };

        let instance_id = self.mint("inst");
        self.files.insert(instance_id.clone(), body.to_vec());
        if let Some(study) = self.studies.get_mut(&study_id) {
            study.instances.push(instance_id);
        }
        Ok(())
    }
}

/// In-memory stand-in for the archive REST surface, one archive per base URL.
#[derive(Default)]
struct FakePacs {
    archives: Mutex<HashMap<String, Archive>>,
}

impl FakePacs {
    fn with_archive<R>(&self, url: &str, f: impl FnOnce(&mut Archive) -> R) -> R {
        let mut archives = self.archives.lock().expect("lock");
        f(archives.entry(url.to_string()).or_default())
    }

    fn seed(&self, url: &str, study_uid: &str, instances: usize) -> String {
        self.with_archive(url, |archive| {
            for n in 0..instances {
                let body = build_test_dicom(study_uid, &format!("{study_uid}.{}", n + 1));
                archive.store(&body).expect("seed");
            }
            archive
                .studies
                .iter()
                .find(|(_, s)| s.uid == study_uid)
                .map(|(id, _)| id.clone())
                .expect("seeded study")
        })
    }

    fn studies_with_uid(&self, url: &str, uid: &str) -> Vec<String> {
        self.with_archive(url, |archive| {
            archive
                .studies
                .iter()
                .filter(|(_, s)| s.uid == uid)
                .map(|(id, _)| id.clone())
                .collect()
        })
    }

    fn instance_files(&self, url: &str, study_id: &str) -> Vec<Vec<u8>> {
        self.with_archive(url, |archive| {
            archive.studies[study_id]
                .instances
                .iter()
                .map(|id| archive.files[id].clone())
                .collect()
        })
    }
}

fn route(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

fn to_json(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).expect("json")
}

impl Transport for FakePacs {
    fn get(&self, endpoint: &PacsEndpoint, path: &str) -> Result<Vec<u8>, TransportError> {
        self.with_archive(&endpoint.url, |archive| match route(path).as_slice() {
            ["studies"] if archive.fail_listing => Err(TransportError::ServerFailure(503)),
            ["studies"] => Ok(to_json(json!(archive.studies.keys().collect::<Vec<_>>()))),
            ["studies", id] => {
                let study = archive.studies.get(*id).ok_or(TransportError::NotFound)?;
                Ok(to_json(json!({
                    "ID": id,
                    "PatientMainDicomTags": { "PatientName": "Test^Patient", "PatientID": "PAT123" },
                    "MainDicomTags": { "StudyInstanceUID": study.uid, "StudyDate": "20240101" },
                })))
            }
            ["studies", id, "instances"] => {
                let study = archive.studies.get(*id).ok_or(TransportError::NotFound)?;
                let descriptors: Vec<_> = study.instances.iter().map(|i| json!({ "ID": i })).collect();
                Ok(to_json(json!(descriptors)))
            }
            ["instances", id, "file"] => archive.files.get(*id).cloned().ok_or(TransportError::NotFound),
            _ => Err(TransportError::NotFound),
        })
    }

    fn post(
        &self,
        endpoint: &PacsEndpoint,
        path: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<Vec<u8>, TransportError> {
        self.with_archive(&endpoint.url, |archive| {
            if route(path).as_slice() != ["instances"] {
                return Err(TransportError::NotFound);
            }
            archive.posts += 1;
            if archive.fail_post_number == Some(archive.posts) {
                return Err(TransportError::ServerFailure(500));
            }
            archive.store(&body)?;
            Ok(b"{}".to_vec())
        })
    }

    fn delete(&self, endpoint: &PacsEndpoint, path: &str) -> Result<(), TransportError> {
        self.with_archive(&endpoint.url, |archive| match route(path).as_slice() {
            ["studies", _] if archive.fail_delete => Err(TransportError::ServerFailure(500)),
            ["studies", id] => {
                let study = archive.studies.remove(*id).ok_or(TransportError::NotFound)?;
                for instance in study.instances {
                    archive.files.remove(&instance);
                }
                Ok(())
            }
            _ => Err(TransportError::NotFound),
        })
    }
}

fn source() -> PacsEndpoint {
    PacsEndpoint::new(SOURCE_URL, "orthanc", "orthanc")
}

fn dest() -> PacsEndpoint {
    PacsEndpoint::new(DEST_URL, "orthanc", "orthanc")
}

fn engine(fake: &Arc<FakePacs>, cache: &Path) -> SyncEngine {
    let transport: SharedTransport = fake.clone();
    let remote = RemoteRepository::new(transport.clone(), source());
    let local = LocalRepository::open(cache, transport).expect("open cache");
    SyncEngine::new(HybridRouter::new(remote, local))
}

fn setup() -> (Arc<FakePacs>, TempDir, SyncEngine) {
    let fake = Arc::new(FakePacs::default());
    let dir = tempdir().expect("tempdir");
    let engine = engine(&fake, &dir.path().join("cache"));
    (fake, dir, engine)
}

fn write_file(dir: &Path, name: &str, study_uid: &str, sop_uid: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(&path, build_test_dicom(study_uid, sop_uid)).expect("write");
    path
}

#[test]
fn remote_send_replaces_same_uid_study() {
    let (fake, _dir, engine) = setup();
    let source_id = fake.seed(SOURCE_URL, "1.2.3.100", 3);
    fake.seed(DEST_URL, "1.2.3.100", 1);
    fake.seed(DEST_URL, "1.2.3.200", 2);

    let report = engine
        .sync_study(&StudyId::Remote(source_id), &dest(), Some("Rezultat: normal"), false)
        .expect("send");
    assert!(report.is_success());
    assert!(report.replaced.is_some());
    assert_eq!(report.succeeded.len(), 3);

    let matches = fake.studies_with_uid(DEST_URL, "1.2.3.100");
    assert_eq!(matches.len(), 1);
    let files = fake.instance_files(DEST_URL, &matches[0]);
    assert_eq!(files.len(), 3);
    for file in &files {
        assert_eq!(embed::extract_result(file), "Rezultat: normal");
        let obj = read_object(file).expect("parse");
        // Archive studies keep patient data unless anonymization is requested.
        assert_eq!(obj.element_str(tags::PATIENT_NAME).as_deref(), Some("Test^Patient"));
    }

    // Unrelated destination studies are untouched.
    let other = fake.studies_with_uid(DEST_URL, "1.2.3.200");
    assert_eq!(other.len(), 1);
    assert_eq!(fake.instance_files(DEST_URL, &other[0]).len(), 2);
}

#[test]
fn failed_delete_aborts_before_any_upload() {
    let (fake, _dir, engine) = setup();
    let source_id = fake.seed(SOURCE_URL, "1.2.3.100", 2);
    fake.seed(DEST_URL, "1.2.3.100", 1);
    fake.with_archive(DEST_URL, |archive| archive.fail_delete = true);

    let err = engine
        .sync_study(&StudyId::Remote(source_id), &dest(), None, false)
        .unwrap_err();
    assert!(matches!(err, PacsError::ReplaceAborted { .. }));

    let matches = fake.studies_with_uid(DEST_URL, "1.2.3.100");
    assert_eq!(matches.len(), 1);
    assert_eq!(fake.instance_files(DEST_URL, &matches[0]).len(), 1);
    assert_eq!(fake.with_archive(DEST_URL, |archive| archive.posts), 0);
}

#[test]
fn partial_failure_is_reported_per_instance() {
    let (fake, _dir, engine) = setup();
    let source_id = fake.seed(SOURCE_URL, "1.2.3.300", 4);
    fake.with_archive(DEST_URL, |archive| archive.fail_post_number = Some(2));

    let report = engine
        .sync_study(&StudyId::Remote(source_id), &dest(), None, false)
        .expect("send");
    assert!(!report.is_success());
    assert_eq!(report.total(), 4);
    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert!(report.replaced.is_none());
    // A rejected upload is a data failure, not a connection failure.
    let (_, reason) = &report.failed[0];
    assert!(reason.starts_with("data error: could not store instance"), "{reason}");
    assert!(reason.ends_with("server failure (500)"), "{reason}");

    let matches = fake.studies_with_uid(DEST_URL, "1.2.3.300");
    assert_eq!(fake.instance_files(DEST_URL, &matches[0]).len(), 3);
}

#[test]
fn router_keeps_namespaces_apart() {
    let (fake, dir, mut engine) = setup();
    let remote_id = fake.seed(SOURCE_URL, "1.2.3.400", 2);
    let file = write_file(dir.path(), "in/one.dcm", "1.2.3.500", "1.2.3.500.1");
    let loaded = engine.router_mut().load_local_file(&file).expect("load");

    let studies = engine.router().get_all_studies();
    assert_eq!(studies, vec![StudyId::Remote(remote_id.clone()), loaded.study.clone()]);
    assert!(loaded.study.as_str().starts_with("local_"));
    assert!(!remote_id.starts_with("local_"));

    let local_instances = engine.router().get_study_instances(&loaded.study).expect("local");
    assert_eq!(local_instances, vec![loaded.instance.clone()]);
    assert!(local_instances.iter().all(InstanceId::is_local));

    let remote_instances = engine
        .router()
        .get_study_instances(&StudyId::Remote(remote_id))
        .expect("remote");
    assert_eq!(remote_instances.len(), 2);
    assert!(remote_instances.iter().all(|i| !i.is_local()));

    let bytes = engine.router().get_dicom_file(&loaded.instance).expect("bytes");
    assert_eq!(bytes, fs::read(&file).expect("read"));
}

#[test]
fn archive_outage_still_lists_local_studies() {
    let (fake, dir, mut engine) = setup();
    fake.seed(SOURCE_URL, "1.2.3.600", 1);
    fake.with_archive(SOURCE_URL, |archive| archive.fail_listing = true);
    let file = write_file(dir.path(), "one.dcm", "1.2.3.700", "1.2.3.700.1");
    let loaded = engine.router_mut().load_local_file(&file).expect("load");

    assert_eq!(engine.router().get_all_studies(), vec![loaded.study]);
}

#[test]
fn loading_the_same_file_twice_is_idempotent() {
    let (_fake, dir, mut engine) = setup();
    let file = write_file(dir.path(), "one.dcm", "1.2.3.800", "1.2.3.800.1");

    let first = engine.router_mut().load_local_file(&file).expect("first");
    let second = engine.router_mut().load_local_file(&file).expect("second");
    assert_eq!(first.study, second.study);
    assert_eq!(first.instance, second.instance);
    assert_eq!(engine.router().local_study_count(), 1);
    assert_eq!(engine.router().get_study_instances(&first.study).expect("instances").len(), 1);
}

#[test]
fn folder_load_groups_files_by_study() {
    let (_fake, dir, mut engine) = setup();
    let folder = dir.path().join("batch");
    write_file(&folder, "a/1.dcm", "1.2.3.900", "1.2.3.900.1");
    write_file(&folder, "a/2.dcm", "1.2.3.900", "1.2.3.900.2");
    write_file(&folder, "b/1.dcm", "1.2.3.901", "1.2.3.901.1");
    fs::write(folder.join("broken.dcm"), b"not a dicom file").expect("write");
    fs::write(folder.join("notes.txt"), b"ignored").expect("write");

    let report = engine.router_mut().load_local_folder(&folder).expect("folder");
    assert_eq!(report.studies.len(), 2);
    assert_eq!(report.loaded_files(), 3);
    let counts: Vec<usize> = report.studies.iter().map(|s| s.file_count).collect();
    assert_eq!(counts, vec![2, 1]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].0.ends_with("broken.dcm"));
    assert_eq!(engine.router().local_study_count(), 2);
}

#[test]
fn missing_folder_is_an_error() {
    let (_fake, dir, mut engine) = setup();
    let err = engine
        .router_mut()
        .load_local_folder(&dir.path().join("nowhere"))
        .unwrap_err();
    assert!(matches!(err, PacsError::Data(_)));
}

#[test]
fn local_index_survives_reopen() {
    let fake = Arc::new(FakePacs::default());
    let dir = tempdir().expect("tempdir");
    let cache = dir.path().join("cache");
    let file = write_file(dir.path(), "one.dcm", "1.2.3.1000", "1.2.3.1000.1");

    let study = {
        let mut first = engine(&fake, &cache);
        let loaded = first.router_mut().load_local_file(&file).expect("load");
        assert!(first
            .router_mut()
            .set_study_result(&loaded.study, "Rezultat: follow-up")
            .expect("set"));
        loaded.study
    };

    let reopened = engine(&fake, &cache);
    assert_eq!(reopened.router().local_study_count(), 1);
    assert_eq!(reopened.router().get_study_result(&study), "Rezultat: follow-up");
    assert!(reopened.router().local().index().last_updated.is_some());
}

#[test]
fn remove_and_clear_forget_local_studies() {
    let (_fake, dir, mut engine) = setup();
    let a = write_file(dir.path(), "a.dcm", "1.2.3.1100", "1.2.3.1100.1");
    let b = write_file(dir.path(), "b.dcm", "1.2.3.1101", "1.2.3.1101.1");
    let first = engine.router_mut().load_local_file(&a).expect("a");
    engine.router_mut().load_local_file(&b).expect("b");

    assert!(engine.router_mut().remove_local_study(&first.study).expect("remove"));
    assert!(!engine.router_mut().remove_local_study(&first.study).expect("again"));
    assert_eq!(engine.router().local_study_count(), 1);
    assert!(engine.router().get_dicom_file(&first.instance).is_err());

    engine.router_mut().clear_local_studies().expect("clear");
    assert_eq!(engine.router().local_study_count(), 0);
}

#[test]
fn local_send_is_anonymized_and_carries_result() {
    let (fake, dir, mut engine) = setup();
    fake.seed(DEST_URL, "1.2.3.1200", 1);
    let file = write_file(dir.path(), "one.dcm", "1.2.3.1200", "1.2.3.1200.9");
    let loaded = engine.router_mut().load_local_file(&file).expect("load");

    let text = "Rezultat: no acute findings";
    let report = engine
        .sync_study(&loaded.study, &dest(), Some(text), false)
        .expect("send");
    assert!(report.is_success());
    assert!(report.replaced.is_some());

    let matches = fake.studies_with_uid(DEST_URL, "1.2.3.1200");
    assert_eq!(matches.len(), 1);
    let files = fake.instance_files(DEST_URL, &matches[0]);
    assert_eq!(files.len(), 1);

    let obj = read_object(&files[0]).expect("parse");
    let name = obj.element_str(tags::PATIENT_NAME).unwrap_or_default();
    assert!(name.starts_with("ANONYMOUS^"), "{name}");
    assert!(obj.element_str(tags::PATIENT_ID).unwrap_or_default().starts_with("ANON"));
    assert_eq!(obj.element_str(tags::PATIENT_ADDRESS).as_deref(), Some(""));
    assert_eq!(embed::extract_result(&files[0]), text);

    // The cached file on disk is left untouched.
    let original = read_object(&fs::read(&file).expect("read")).expect("parse");
    assert_eq!(original.element_str(tags::PATIENT_NAME).as_deref(), Some("Test^Patient"));
}

#[test]
fn queue_send_counts_every_outcome() {
    let (fake, dir, mut engine) = setup();
    let remote_id = fake.seed(SOURCE_URL, "1.2.3.1300", 2);
    let file = write_file(dir.path(), "one.dcm", "1.2.3.1301", "1.2.3.1301.1");
    let loaded = engine.router_mut().load_local_file(&file).expect("load");

    let queue = vec![
        QueuedStudy {
            study: loaded.study.to_string(),
            result: Some("Rezultat: stable".into()),
        },
        QueuedStudy {
            study: remote_id,
            result: Some("   ".into()),
        },
        QueuedStudy {
            study: "does-not-exist".into(),
            result: None,
        },
    ];
    let batch = engine.send_queue(&queue, &dest(), true);

    assert_eq!(batch.total(), 3);
    assert_eq!(batch.with_result, 1);
    assert_eq!(batch.local, 1);
    assert_eq!(batch.remote, 2);
    assert_eq!(batch.succeeded.len(), 2);
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].0, StudyId::Remote("does-not-exist".into()));
    assert!(!batch.is_complete_success());

    assert_eq!(fake.studies_with_uid(DEST_URL, "1.2.3.1300").len(), 1);
    assert_eq!(fake.studies_with_uid(DEST_URL, "1.2.3.1301").len(), 1);
}

#[test]
fn results_fall_back_to_the_study_cache() {
    let (_fake, dir, mut engine) = setup();
    let file = write_file(dir.path(), "one.dcm", "1.2.3.1400", "1.2.3.1400.1");
    let loaded = engine.router_mut().load_local_file(&file).expect("load");

    assert_eq!(engine.router().get_instance_result(&loaded.instance), "");
    engine
        .router_mut()
        .set_study_result(&loaded.study, "Rezultat: cached")
        .expect("set");
    assert_eq!(engine.router().get_instance_result(&loaded.instance), "Rezultat: cached");

    // An embedded result wins over the cache.
    let bytes = fs::read(&file).expect("read");
    fs::write(&file, embed::try_embed(&bytes, "Rezultat: embedded").expect("embed")).expect("write");
    assert_eq!(engine.router().get_instance_result(&loaded.instance), "Rezultat: embedded");
}

#[test]
fn remote_study_result_reads_embedded_payloads() {
    let (fake, _dir, mut engine) = setup();
    let study_id = fake.seed(SOURCE_URL, "1.2.3.1500", 1);
    let body = embed::try_embed(&build_test_dicom("1.2.3.1500", "1.2.3.1500.2"), "Rezultat: remote")
        .expect("embed");
    fake.with_archive(SOURCE_URL, |archive| archive.store(&body)).expect("store");

    let study = StudyId::Remote(study_id);
    assert_eq!(engine.router().get_study_result(&study), "Rezultat: remote");
    // Archive studies carry results only inside their payloads.
    assert!(!engine
        .router_mut()
        .set_study_result(&study, "Rezultat: ignored")
        .expect("set"));
}
