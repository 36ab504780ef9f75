use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::profile::model::ProfileRecord;

const STORE_FILE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("profile store returned malformed data: {0}")]
    Malformed(String),
    #[error("profile store unreachable: {0}")]
    Transport(String),
    #[error("profile store rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Durable home of the user's profile. Implementations are blocking and do
/// not retry.
pub trait ProfileStore: Send + Sync {
    fn fetch(&self) -> Result<Option<ProfileRecord>, StoreError>;
    fn write(&self, payload: &ProfileRecord) -> Result<(), StoreError>;
    fn delete(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileStore for FileProfileStore {
    fn fetch(&self) -> Result<Option<ProfileRecord>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored profile");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        parse_profile_file_text(&content).map(Some)
    }

    fn write(&self, payload: &ProfileRecord) -> Result<(), StoreError> {
        let document = ProfileFile {
            version: STORE_FILE_VERSION,
            profile: payload.clone(),
        };
        let text = serde_json::to_string_pretty(&document)
            .map_err(|err| StoreError::Malformed(err.to_string()))?;
        fs::write(&self.path, format!("{text}\n"))?;
        debug!(path = %self.path.display(), "stored profile written");
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn parse_profile_file_text(content: &str) -> Result<ProfileRecord, StoreError> {
    let raw = serde_json::from_str::<ProfileFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        StoreError::Malformed(format!("invalid JSON at line {line}, column {column}: {err}"))
    })?;

    if raw.version != STORE_FILE_VERSION {
        return Err(StoreError::Malformed(format!(
            "unsupported profile file version {}; expected version {STORE_FILE_VERSION}",
            raw.version
        )));
    }
    Ok(raw.profile)
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileFile {
    version: u32,
    profile: ProfileRecord,
}
