use std::collections::BTreeMap;

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use serde::Deserialize;
use serde_json::Value;

use crate::dicom_access::ElementAccess;
use crate::models::{StudyMetadata, NOT_AVAILABLE};

pub const LOCAL_SERIES_STATUS: &str = "LOCAL";
pub const LOCAL_SOURCE: &str = "Local File";
pub const LOCAL_DESCRIPTION: &str = "Local DICOM Study";

/// Study resource as returned by `GET {base}/studies/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveStudy {
    #[serde(default)]
    pub patient_main_dicom_tags: BTreeMap<String, Value>,
    #[serde(default)]
    pub main_dicom_tags: BTreeMap<String, Value>,
    #[serde(default)]
    pub series_main_dicom_tags: BTreeMap<String, Value>,
}

impl ArchiveStudy {
    pub fn study_instance_uid(&self) -> Option<&str> {
        self.main_dicom_tags
            .get("StudyInstanceUID")
            .and_then(Value::as_str)
    }
}

fn lookup(map: &BTreeMap<String, Value>, key: &str, default: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

pub fn from_archive(study: &ArchiveStudy) -> StudyMetadata {
    let patient = |key| lookup(&study.patient_main_dicom_tags, key, NOT_AVAILABLE);
    let main = |key| lookup(&study.main_dicom_tags, key, NOT_AVAILABLE);
    let series = |key| lookup(&study.series_main_dicom_tags, key, NOT_AVAILABLE);

    StudyMetadata {
        patient_name: patient("PatientName"),
        patient_id: patient("PatientID"),
        patient_birth_date: patient("PatientBirthDate"),
        patient_sex: patient("PatientSex"),
        patient_age: patient("PatientAge"),
        study_date: main("StudyDate"),
        study_time: main("StudyTime"),
        description: main("StudyDescription"),
        study_instance_uid: main("StudyInstanceUID"),
        referring_physician: main("ReferringPhysicianName"),
        study_id: main("StudyID"),
        accession_number: main("AccessionNumber"),
        institution_name: main("InstitutionName"),
        modality: main("Modality"),
        series_description: series("SeriesDescription"),
        body_part_examined: series("BodyPartExamined"),
        series_status: lookup(&study.series_main_dicom_tags, "Status", "Available"),
        source: None,
    }
}

fn text_for_tag<T: ElementAccess>(obj: &T, tag: Tag) -> String {
    obj.element_str(tag)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// `YYYYMMDD` rendered as `YYYY-MM-DD`; shorter values are `Unknown`.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() < 8 || !raw.is_char_boundary(8) {
        return "Unknown".to_string();
    }
    format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..8])
}

pub fn from_dataset<T: ElementAccess>(obj: &T) -> StudyMetadata {
    let date = |tag| format_date(&obj.element_str(tag).unwrap_or_default());

    StudyMetadata {
        patient_name: text_for_tag(obj, tags::PATIENT_NAME),
        patient_id: text_for_tag(obj, tags::PATIENT_ID),
        patient_birth_date: date(tags::PATIENT_BIRTH_DATE),
        patient_sex: text_for_tag(obj, tags::PATIENT_SEX),
        patient_age: text_for_tag(obj, tags::PATIENT_AGE),
        study_date: date(tags::STUDY_DATE),
        study_time: text_for_tag(obj, tags::STUDY_TIME),
        description: obj
            .element_str(tags::STUDY_DESCRIPTION)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| LOCAL_DESCRIPTION.to_string()),
        study_instance_uid: text_for_tag(obj, tags::STUDY_INSTANCE_UID),
        referring_physician: text_for_tag(obj, tags::REFERRING_PHYSICIAN_NAME),
        study_id: text_for_tag(obj, tags::STUDY_ID),
        accession_number: text_for_tag(obj, tags::ACCESSION_NUMBER),
        institution_name: text_for_tag(obj, tags::INSTITUTION_NAME),
        modality: text_for_tag(obj, tags::MODALITY),
        series_description: text_for_tag(obj, tags::SERIES_DESCRIPTION),
        body_part_examined: text_for_tag(obj, tags::BODY_PART_EXAMINED),
        series_status: LOCAL_SERIES_STATUS.to_string(),
        source: Some(LOCAL_SOURCE.to_string()),
    }
}

pub fn print_info(study: &str, meta: &StudyMetadata) {
    println!("{}", "=".repeat(80));
    println!("Study: {study}");
    println!("{}", "=".repeat(80));

    println!("PATIENT");
    println!("  Name:       {}", meta.patient_name);
    println!("  ID:         {}", meta.patient_id);
    println!("  Birth Date: {}", meta.patient_birth_date);
    println!("  Sex:        {}", meta.patient_sex);
    println!("  Age:        {}", meta.patient_age);

    println!("\nSTUDY");
    println!("  Date:        {} {}", meta.study_date, meta.study_time);
    println!("  Description: {}", meta.description);
    println!("  UID:         {}", meta.study_instance_uid);
    println!("  Accession:   {}", meta.accession_number);
    println!("  Referring:   {}", meta.referring_physician);

    println!("\nSERIES / EQUIPMENT");
    println!("  Modality:    {}", meta.modality);
    println!("  Institution: {}", meta.institution_name);
    println!("  Series:      {}", meta.series_description);
    println!("  Body Part:   {}", meta.body_part_examined);
    println!("  Status:      {}", meta.series_status);
    if let Some(source) = &meta.source {
        println!("  Source:      {source}");
    }
}
