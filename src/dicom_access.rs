use std::path::Path;

use anyhow::{Context, Result};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, OpenFileOptions};

/// Byte offset of the `DICM` magic code in a Part 10 file.
pub const MAGIC_OFFSET: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Small helper trait to pull string values from a parsed DICOM object.
pub trait ElementAccess {
    /// Value with trailing padding trimmed.
    fn element_str(&self, tag: Tag) -> Option<String>;
    /// Value exactly as decoded, padding included.
    fn element_raw_str(&self, tag: Tag) -> Option<String>;
    fn has_element(&self, tag: Tag) -> bool;
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        let raw = self.element_raw_str(tag)?;
        Some(raw.trim_end_matches([' ', '\0']).to_string())
    }

    fn element_raw_str(&self, tag: Tag) -> Option<String> {
        let value = self.element(tag).ok()?.value().primitive()?;
        match value {
            // Private tags in implicit VR files come back as UN bytes.
            PrimitiveValue::U8(bytes) => Some(String::from_utf8_lossy(&bytes[..]).into_owned()),
            other => Some(other.to_raw_str().into_owned()),
        }
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }
}

/// True when the buffer carries the Part 10 preamble followed by `DICM`.
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC_OFFSET + MAGIC.len() && &bytes[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()] == MAGIC
}

/// Parse an in-memory Part 10 payload, with or without the 128-byte preamble.
pub fn read_object(bytes: &[u8]) -> Result<DefaultDicomObject> {
    let body = if has_magic(bytes) {
        &bytes[MAGIC_OFFSET..]
    } else {
        bytes
    };
    dicom::object::from_reader(body).context("Failed to parse DICOM payload")
}

/// Encode an object back to a complete Part 10 payload (preamble, meta group, data set).
pub fn write_object(obj: &DefaultDicomObject) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    obj.write_all(&mut out)
        .context("Failed to encode DICOM payload")?;
    Ok(out)
}

/// Parse only the header of a file, stopping before pixel data.
pub fn read_header(path: &Path) -> Result<DefaultDicomObject> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .with_context(|| format!("Failed to parse DICOM header of {}", path.display()))
}

pub fn put_text(obj: &mut DefaultDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

/// Replace a value keeping the VR the element already had, if any.
pub fn replace_text(obj: &mut DefaultDicomObject, tag: Tag, fallback_vr: VR, value: &str) {
    let vr = obj
        .element(tag)
        .map(|e| e.header().vr)
        .unwrap_or(fallback_vr);
    if value.is_empty() {
        obj.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
    } else {
        put_text(obj, tag, vr, value);
    }
}
