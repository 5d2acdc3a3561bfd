// Test-only builders for small Secondary Capture payloads.

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::{DefaultDicomObject, FileDicomObject, FileMetaTableBuilder};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;

use crate::dicom_access::write_object;

const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";

pub fn sample_object(study_uid: &str, sop_uid: &str) -> DefaultDicomObject {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(SECONDARY_CAPTURE)
        .media_storage_sop_instance_uid(sop_uid)
        .build()
        .expect("meta");

    let mut obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    let elements: [(Tag, VR, &str); 14] = [
        (tags::SOP_CLASS_UID, VR::UI, SECONDARY_CAPTURE),
        (tags::SOP_INSTANCE_UID, VR::UI, sop_uid),
        (tags::STUDY_INSTANCE_UID, VR::UI, study_uid),
        (tags::SERIES_INSTANCE_UID, VR::UI, "1.2.826.0.1.3680043.2.1125.9"),
        (tags::PATIENT_NAME, VR::PN, "Test^Patient"),
        (tags::PATIENT_ID, VR::LO, "PAT123"),
        (tags::PATIENT_BIRTH_DATE, VR::DA, "19700101"),
        (tags::PATIENT_SEX, VR::CS, "F"),
        (tags::STUDY_DATE, VR::DA, "20240101"),
        (tags::STUDY_DESCRIPTION, VR::LO, "CT ABDOMEN"),
        (tags::ACCESSION_NUMBER, VR::SH, "ACC-991"),
        (tags::INSTITUTION_NAME, VR::LO, "General Hospital"),
        (tags::PATIENT_ADDRESS, VR::LO, "1 Main Street"),
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
    obj
}

pub fn to_bytes(obj: &DefaultDicomObject) -> Vec<u8> {
    write_object(obj).expect("encode sample")
}
