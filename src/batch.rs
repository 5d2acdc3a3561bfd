use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::dicom_access::{has_magic, read_header, MAGIC_OFFSET};

pub const DICOM_EXTENSIONS: [&str; 3] = ["dcm", "dicom", "dic"];

fn has_dicom_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            DICOM_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn has_magic_on_disk(path: &Path) -> bool {
    let mut header = [0u8; MAGIC_OFFSET + 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map(|_| has_magic(&header))
        .unwrap_or(false)
}

/// Extension first, then the `DICM` magic, then a header-only parse attempt.
pub fn is_dicom_file(path: &Path) -> bool {
    has_dicom_extension(path) || has_magic_on_disk(path) || read_header(path).is_ok()
}

/// Every DICOM candidate below `dir`, in a stable (file name) order.
pub fn discover_dicom_files(dir: &Path) -> Vec<PathBuf> {
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    // Sniffing may read headers, so it runs in parallel; collect keeps input order.
    let candidates: Vec<PathBuf> = files
        .par_iter()
        .filter(|path| is_dicom_file(path))
        .cloned()
        .collect();

    tracing::debug!(
        directory = %dir.display(),
        scanned = files.len(),
        candidates = candidates.len(),
        "folder scan finished"
    );
    candidates
}
