//
// models.rs
// PACS-Sync
//
// Defines the identifiers, metadata records, endpoints and per-item reports shared by repositories and the sync engine.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix carried by every identifier minted for a disk-origin study or instance.
pub const LOCAL_PREFIX: &str = "local_";

/// Placeholder used for any metadata field the source did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Study identifier tagged with the repository that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StudyId {
    Local(String),
    Remote(String),
}

/// Instance identifier tagged with the repository that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstanceId {
    Local(String),
    Remote(String),
}

impl StudyId {
    pub fn as_str(&self) -> &str {
        match self {
            StudyId::Local(id) | StudyId::Remote(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StudyId::Local(_))
    }
}

impl InstanceId {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceId::Local(id) | InstanceId::Remote(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, InstanceId::Local(_))
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// User-typed identifiers are the only place where the namespace is sniffed from the text.
impl FromStr for StudyId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(LOCAL_PREFIX) {
            Ok(StudyId::Local(s.to_string()))
        } else {
            Ok(StudyId::Remote(s.to_string()))
        }
    }
}

impl FromStr for InstanceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(LOCAL_PREFIX) {
            Ok(InstanceId::Local(s.to_string()))
        } else {
            Ok(InstanceId::Remote(s.to_string()))
        }
    }
}

/// URL plus Basic credentials for one archive.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacsEndpoint {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl PacsEndpoint {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Join a path below the archive root.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl fmt::Debug for PacsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacsEndpoint")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Patient, study, series and equipment attributes of a study, each defaulted to `N/A`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyMetadata {
    pub patient_name: String,
    pub patient_id: String,
    pub patient_birth_date: String,
    pub patient_sex: String,
    pub patient_age: String,
    pub study_date: String,
    pub study_time: String,
    pub description: String,
    pub study_instance_uid: String,
    pub referring_physician: String,
    pub study_id: String,
    pub accession_number: String,
    pub institution_name: String,
    pub modality: String,
    pub series_description: String,
    pub body_part_examined: String,
    pub series_status: String,
    pub source: Option<String>,
}

impl Default for StudyMetadata {
    fn default() -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            patient_name: na(),
            patient_id: na(),
            patient_birth_date: na(),
            patient_sex: na(),
            patient_age: na(),
            study_date: na(),
            study_time: na(),
            description: na(),
            study_instance_uid: na(),
            referring_physician: na(),
            study_id: na(),
            accession_number: na(),
            institution_name: na(),
            modality: na(),
            series_description: na(),
            body_part_examined: na(),
            series_status: "Available".to_string(),
            source: None,
        }
    }
}

impl StudyMetadata {
    /// The Study Instance UID, unless it is missing or the placeholder.
    pub fn uid(&self) -> Option<&str> {
        let uid = self.study_instance_uid.trim();
        if uid.is_empty() || uid == NOT_AVAILABLE {
            None
        } else {
            Some(uid)
        }
    }

    pub fn display_text(&self) -> String {
        format!("{} - {} - {}", self.patient_name, self.study_date, self.description)
    }
}

/// One disk-origin instance as recorded in the local index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalInstance {
    pub id: String,
    pub study_id: String,
    pub file_path: PathBuf,
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    pub instance_number: String,
}

/// Outcome of loading one file into the local repository.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub study: StudyId,
    pub instance: InstanceId,
    pub metadata: StudyMetadata,
}

/// Per-study aggregate of a folder load.
#[derive(Debug, Clone)]
pub struct LoadedStudy {
    pub study: StudyId,
    pub metadata: StudyMetadata,
    pub file_count: usize,
}

/// Result of a folder scan: loaded studies plus the files that could not be read.
#[derive(Debug, Clone, Default)]
pub struct FolderReport {
    pub studies: Vec<LoadedStudy>,
    pub failed: Vec<(PathBuf, String)>,
}

impl FolderReport {
    pub fn loaded_files(&self) -> usize {
        self.studies.iter().map(|s| s.file_count).sum()
    }
}

/// Per-instance accounting of a single study synchronization.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub study: StudyId,
    /// Destination study removed before recreating, if one carried the same UID.
    pub replaced: Option<String>,
    pub succeeded: Vec<InstanceId>,
    pub failed: Vec<(InstanceId, String)>,
}

impl SyncReport {
    pub fn new(study: StudyId) -> Self {
        Self {
            study,
            replaced: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True only when every instance reached the destination.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A study waiting to be sent, with the result text to embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedStudy {
    pub study: String,
    #[serde(default)]
    pub result: Option<String>,
}

impl QueuedStudy {
    pub fn study_id(&self) -> StudyId {
        match self.study.parse() {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }

    /// The result to embed; blank text counts as none.
    pub fn effective_result(&self) -> Option<&str> {
        self.result.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Per-study accounting of a queue send.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<SyncReport>,
    pub failed: Vec<(StudyId, String)>,
    pub with_result: usize,
    pub local: usize,
    pub remote: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}
