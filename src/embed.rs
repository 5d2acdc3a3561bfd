//
// embed.rs
// PACS-Sync
//
// Writes free-text examination results into private tags (chunked past the LT limit) plus human-readable mirrors, and reads them back.
//
// Thales Matheus Mendonça Santos - October 2026

use anyhow::Result;
use dicom::core::{Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::DefaultDicomObject;

use crate::dicom_access::{put_text, read_object, write_object, ElementAccess};

pub const PRIVATE_GROUP: u16 = 0x7777;
pub const MARKER_TAG: Tag = Tag(PRIVATE_GROUP, 0x0010);
pub const CHUNK_COUNT_TAG: Tag = Tag(PRIVATE_GROUP, 0x0020);
pub const FIRST_CHUNK_ELEMENT: u16 = 0x1001;
pub const MARKER: &str = "MEDICAL_APP_RESULT";

/// Payload tags are UT: LT carries a 16-bit length in explicit VR syntaxes, which
/// multi-byte text overflows well before the char limits below.
pub const PAYLOAD_VR: VR = VR::UT;

/// Texts up to this many chars go into a single payload tag.
pub const SINGLE_TAG_LIMIT: usize = 65_534;
/// Chars per chunk, whatever their encoded width.
pub const CHUNK_SIZE: usize = 65_000;
pub const MAX_CHUNKS: usize = 10;
/// Longest text, in chars, that survives embedding intact.
pub const CAPACITY: usize = CHUNK_SIZE * MAX_CHUNKS;

pub const COMMENTS_LIMIT: usize = 10_240;
pub const COMMENTS_KEEP: usize = 10_200;
pub const TRUNCATED_MARKER: &str = "\n\n[TRUNCATED]";

/// Study Comments (0032,4000), retired but still read by older viewers.
pub const STUDY_COMMENTS_TAG: Tag = Tag(0x0032, 0x4000);
pub const LEGACY_PREFIX: &str = "EXAMINATION RESULT: ";
const LEGACY_KEEP: usize = 200;

pub fn chunk_tag(index: usize) -> Tag {
    Tag(PRIVATE_GROUP, FIRST_CHUNK_ELEMENT + index as u16)
}

/// First `n` chars of `text`, never splitting a code point.
fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn split_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() && chunks.len() < MAX_CHUNKS {
        let chunk = take_chars(rest, CHUNK_SIZE);
        chunks.push(chunk);
        rest = &rest[chunk.len()..];
    }
    if !rest.is_empty() {
        tracing::warn!(
            dropped_chars = rest.chars().count(),
            "examination result exceeds embedding capacity, truncating"
        );
    }
    chunks
}

fn clear_previous(obj: &mut DefaultDicomObject) {
    obj.remove_element(MARKER_TAG);
    obj.remove_element(CHUNK_COUNT_TAG);
    for index in 0..MAX_CHUNKS {
        obj.remove_element(chunk_tag(index));
    }
}

/// Write the result into every target of an already-parsed object.
pub fn embed_into_object(obj: &mut DefaultDicomObject, text: &str) {
    if !text.is_ascii() {
        put_text(obj, tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 192");
    }

    let comments = if text.chars().count() <= COMMENTS_LIMIT {
        text.to_string()
    } else {
        format!("{}{}", take_chars(text, COMMENTS_KEEP), TRUNCATED_MARKER)
    };
    put_text(obj, tags::IMAGE_COMMENTS, VR::LT, &comments);

    clear_previous(obj);
    put_text(obj, MARKER_TAG, VR::LO, MARKER);

    if text.chars().count() <= SINGLE_TAG_LIMIT {
        put_text(obj, chunk_tag(0), PAYLOAD_VR, text);
    } else {
        let chunks = split_chunks(text);
        for (index, chunk) in chunks.iter().enumerate() {
            put_text(obj, chunk_tag(index), PAYLOAD_VR, chunk);
        }
        put_text(obj, CHUNK_COUNT_TAG, VR::IS, &chunks.len().to_string());
    }

    if !obj.has_element(STUDY_COMMENTS_TAG) {
        let legacy = format!("{LEGACY_PREFIX}{}", take_chars(text, LEGACY_KEEP));
        put_text(obj, STUDY_COMMENTS_TAG, VR::LT, &legacy);
    }
}

pub fn try_embed(bytes: &[u8], text: &str) -> Result<Vec<u8>> {
    let mut obj = read_object(bytes)?;
    embed_into_object(&mut obj, text);
    write_object(&obj)
}

/// Fail-open embedding: the original payload is returned if it cannot be rewritten.
pub fn embed_result(bytes: &[u8], text: &str) -> Vec<u8> {
    match try_embed(bytes, text) {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "could not embed examination result, sending payload as is");
            bytes.to_vec()
        }
    }
}

fn reassemble_chunks(obj: &DefaultDicomObject) -> Option<String> {
    let count: usize = obj.element_str(CHUNK_COUNT_TAG)?.trim().parse().ok()?;
    let count = count.min(MAX_CHUNKS);

    let mut parts = Vec::with_capacity(count);
    for index in 0..count {
        let Some(raw) = obj.element_raw_str(chunk_tag(index)) else {
            continue;
        };
        // Full chunks are exactly CHUNK_SIZE chars; anything past that is padding.
        let is_last = index + 1 == count;
        let part = if is_last {
            raw.trim_end_matches([' ', '\0']).to_string()
        } else {
            take_chars(&raw, CHUNK_SIZE).to_string()
        };
        parts.push(part);
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.concat())
    }
}

/// Read a result back from a parsed object. Absence yields an empty string.
///
/// Text values are space-padded to an even length on the wire, so trailing
/// spaces (and NULs) at the very end of a result do not survive a round trip.
pub fn extract_from_object(obj: &DefaultDicomObject) -> String {
    let has_marker = obj
        .element_str(MARKER_TAG)
        .map_or(false, |marker| marker.trim() == MARKER);

    if has_marker {
        if let Some(result) = reassemble_chunks(obj) {
            return result;
        }
        if let Some(single) = obj.element_str(chunk_tag(0)) {
            return single;
        }
    }

    if let Some(comments) = obj.element_str(tags::IMAGE_COMMENTS) {
        return comments;
    }

    if let Some(legacy) = obj.element_str(STUDY_COMMENTS_TAG) {
        if let Some(result) = legacy.strip_prefix(LEGACY_PREFIX) {
            return result.to_string();
        }
    }

    String::new()
}

/// Never fails: unparseable payloads yield an empty string.
pub fn extract_result(bytes: &[u8]) -> String {
    match read_object(bytes) {
        Ok(obj) => extract_from_object(&obj),
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "no examination result: payload unreadable");
            String::new()
        }
    }
}
