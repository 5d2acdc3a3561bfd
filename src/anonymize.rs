use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dicom::core::{Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::DefaultDicomObject;
use sha2::{Digest, Sha256};

use crate::dicom_access::{read_object, replace_text, write_object, ElementAccess};

const PSEUDONYM_MODULUS: u32 = 999_999;

// Blanked when present.
const PERSONAL_FIELDS: [(Tag, VR); 6] = [
    (tags::PATIENT_ADDRESS, VR::LO),
    (tags::PATIENT_TELEPHONE_NUMBERS, VR::SH),
    (tags::ETHNIC_GROUP, VR::SH),
    (tags::PATIENT_COMMENTS, VR::LT),
    (tags::OTHER_PATIENT_I_DS, VR::LO),
    (tags::OTHER_PATIENT_NAMES, VR::PN),
];

/// Deterministic pseudonym for an identifying triple: `ANON` plus six digits.
pub fn pseudonym(name: &str, id: &str, birth_date: &str) -> String {
    let unique = format!("{}|{}|{}", name.trim(), id.trim(), birth_date.trim());
    let digest = Sha256::digest(unique.as_bytes());
    // First 32 bits of the digest, i.e. the leading 8 hex digits.
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("ANON{:06}", value % PSEUDONYM_MODULUS)
}

fn suffix(pseudonym: &str) -> &str {
    &pseudonym[pseudonym.len().saturating_sub(6)..]
}

fn pseudonym_for(obj: &DefaultDicomObject) -> String {
    let field = |tag| obj.element_str(tag).unwrap_or_default();
    pseudonym(
        &field(tags::PATIENT_NAME),
        &field(tags::PATIENT_ID),
        &field(tags::PATIENT_BIRTH_DATE),
    )
}

/// Replace identifying attributes in place.
pub fn anonymize_object(obj: &mut DefaultDicomObject) -> String {
    let anon_id = pseudonym_for(obj);
    let tail = suffix(&anon_id).to_string();

    replace_text(obj, tags::PATIENT_NAME, VR::PN, &format!("ANONYMOUS^{tail}"));
    replace_text(obj, tags::PATIENT_ID, VR::LO, &anon_id);
    replace_text(obj, tags::PATIENT_BIRTH_DATE, VR::DA, "");
    replace_text(obj, tags::PATIENT_SEX, VR::CS, "");
    replace_text(obj, tags::PATIENT_AGE, VR::AS, "");

    let conditional = [
        (tags::INSTITUTION_NAME, VR::LO, "ANONYMOUS_HOSPITAL".to_string()),
        (tags::REFERRING_PHYSICIAN_NAME, VR::PN, "ANONYMOUS^DOCTOR".to_string()),
        (tags::ACCESSION_NUMBER, VR::SH, format!("ACC{tail}")),
        (tags::STUDY_ID, VR::SH, format!("STUDY{tail}")),
    ];
    for (tag, vr, value) in conditional {
        if obj.has_element(tag) {
            replace_text(obj, tag, vr, &value);
        }
    }

    for (tag, vr) in PERSONAL_FIELDS {
        if obj.has_element(tag) {
            replace_text(obj, tag, vr, "");
        }
    }

    anon_id
}

/// Strict variant: any parse or encode failure is returned to the caller.
pub fn try_anonymize(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut obj = read_object(bytes)?;
    let anon_id = anonymize_object(&mut obj);
    tracing::debug!(pseudonym = %anon_id, "anonymized payload");
    write_object(&obj)
}

/// Fail-open anonymization: on any internal error the original bytes come back unchanged.
pub fn anonymize(bytes: &[u8]) -> Vec<u8> {
    match try_anonymize(bytes) {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "anonymization failed, forwarding original payload");
            bytes.to_vec()
        }
    }
}

pub fn process_file(input: &Path, output: Option<PathBuf>) -> Result<PathBuf> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let anonymized = try_anonymize(&bytes)?;

    // Default to *_anon.dcm next to the input
    let output_path = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dicom");
        input.with_file_name(format!("{stem}_anon.dcm"))
    });

    fs::write(&output_path, anonymized)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    Ok(output_path)
}
