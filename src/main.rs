//
// main.rs
// PACS-Sync
//
// Synchronous entry point that hands off execution to the CLI layer; the blocking HTTP client owns its own runtime.
//
// Thales Matheus Mendonça Santos - October 2026

use pacs_sync::cli;

fn main() -> anyhow::Result<()> {
    cli::run()
}
