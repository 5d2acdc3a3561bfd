//
// config.rs
// PACS-Sync
//
// Loads source/target archive endpoints and the local cache directory from a TOML file, with built-in defaults.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::PacsEndpoint;

pub const DEFAULT_SOURCE_URL: &str = "http://localhost:8042";
pub const DEFAULT_TARGET_URL: &str = "http://localhost:8052";
pub const DEFAULT_USERNAME: &str = "orthanc";
pub const DEFAULT_PASSWORD: &str = "orthanc";
pub const DEFAULT_CACHE_DIR: &str = "local_studies_cache";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cache_dir: PathBuf,
    pub source: PacsEndpoint,
    pub target: PacsEndpoint,
}

/// `[source]` / `[target]` table as written; every key may be omitted.
#[derive(Default, Deserialize)]
#[serde(default)]
struct EndpointSection {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl EndpointSection {
    fn resolve(self, default_url: &str) -> PacsEndpoint {
        PacsEndpoint::new(
            self.url.unwrap_or_else(|| default_url.to_string()),
            self.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            self.password.unwrap_or_else(|| DEFAULT_PASSWORD.to_string()),
        )
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    cache_dir: Option<PathBuf>,
    source: EndpointSection,
    target: EndpointSection,
}

impl From<ConfigFile> for AppConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            cache_dir: file
                .cache_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            source: file.source.resolve(DEFAULT_SOURCE_URL),
            target: file.target.resolve(DEFAULT_TARGET_URL),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        ConfigFile::default().into()
    }
}

impl AppConfig {
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).context("Failed to parse TOML")?;
        let config = AppConfig::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if given; otherwise fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        for (name, endpoint) in [("source", &self.source), ("target", &self.target)] {
            if !(endpoint.url.starts_with("http://") || endpoint.url.starts_with("https://")) {
                anyhow::bail!("{name}.url must be an http(s) URL, got {:?}", endpoint.url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = AppConfig::from_toml(
            r#"
            cache_dir = "/var/cache/pacs-sync"

            [target]
            url = "https://archive.example.org"
            username = "sync"
            password = "hunter2"
            "#,
        )
        .expect("parse");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/pacs-sync"));
        assert_eq!(config.source.url, DEFAULT_SOURCE_URL);
        assert_eq!(config.target.username, "sync");
    }

    #[test]
    fn no_file_means_defaults() {
        let config = AppConfig::load(None).expect("defaults");
        assert_eq!(config.target.url, DEFAULT_TARGET_URL);
        assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
    }

    #[test]
    fn url_only_section_keeps_default_credentials() {
        let config = AppConfig::from_toml("[source]\nurl = \"http://pacs.internal:8042/\"\n").expect("parse");
        assert_eq!(config.source.url, "http://pacs.internal:8042");
        assert_eq!(config.source.username, DEFAULT_USERNAME);
        assert_eq!(config.source.password, DEFAULT_PASSWORD);
        assert_eq!(config.target.url, DEFAULT_TARGET_URL);
    }

    #[test]
    fn credentials_alone_keep_default_url() {
        let config = AppConfig::from_toml("[target]\nusername = \"sync\"\n").expect("parse");
        assert_eq!(config.target.url, DEFAULT_TARGET_URL);
        assert_eq!(config.target.username, "sync");
        assert_eq!(config.target.password, DEFAULT_PASSWORD);
    }

    #[test]
    fn non_http_url_is_rejected() {
        let err = AppConfig::from_toml("[source]\nurl = \"ftp://x\"\nusername = \"a\"\npassword = \"b\"\n");
        assert!(err.is_err());
    }
}
