//! Loading head files and page templates from disk.

use head::HeadManifest;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid head file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_manifest(path: &Path) -> Result<HeadManifest, ConfigError> {
    let text = read(path)?;
    let manifest: HeadManifest = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(
        target: "headstack",
        "loaded {} entries from {}",
        manifest.entries.len(),
        path.display()
    );
    Ok(manifest)
}

pub fn load_template(path: &Path) -> Result<String, ConfigError> {
    read(path)
}
