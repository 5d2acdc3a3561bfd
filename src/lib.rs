//
// lib.rs
// PACS-Sync
//
// Exposes the crate's modules and re-exports the CLI entry point for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - October 2026

// Archive-facing layers (transport, remote, sync) sit next to the file-level DICOM utilities.
pub mod anonymize;
pub mod batch;
pub mod cli;
pub mod config;
pub mod dicom_access;
pub mod embed;
pub mod error;
pub mod local;
pub mod metadata;
pub mod models;
pub mod remote;
pub mod router;
pub mod storage;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod fixtures;

pub use cli::{run as run_cli, Cli, Commands};
pub use error::{PacsError, TransportError};
pub use models::{InstanceId, PacsEndpoint, StudyId};
pub use router::HybridRouter;
pub use sync::SyncEngine;
