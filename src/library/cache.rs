//! Rebuildable TOML cache of a built index.
//!
//! The cache is never required: a missing or damaged cache only means the
//! index is rebuilt from its source.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::model::TrackEntry;

pub(crate) const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CacheFile {
    pub version: u32,
    pub built_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub tracks: Vec<TrackEntry>,
}

pub(crate) fn write_cache(path: &Path, file: &CacheFile) -> Result<()> {
    let text = toml::to_string(file)
        .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, text).map_err(|e| Error::io(path, e))
}

pub(crate) fn read_cache(path: &Path) -> Result<CacheFile> {
    let name = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let file: CacheFile = toml::from_str(&text).map_err(|e| Error::parse(&name, e.to_string()))?;
    if file.version != CACHE_VERSION {
        return Err(Error::parse(
            name,
            format!("cache version {} (expected {CACHE_VERSION})", file.version),
        ));
    }
    Ok(file)
}
