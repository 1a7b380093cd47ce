//! File-backed storage for the OAuth2 credential cache.
//!
//! This module owns the on-disk credential format: a single JSON file holding
//! the access token, the optional refresh token, and the expiry timestamp.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error;

/// Seconds before the recorded expiry at which a credential already counts
/// as expired, absorbing clock skew and in-flight request time
const EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Credential cache I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize credential: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A persisted OAuth2 credential.
#[derive(Serialize, Deserialize, Clone)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct StoredCredential {
    #[serde(rename = "access_token")]
    pub access_token: String,

    #[serde(rename = "refresh_token")]
    pub refresh_token: Option<String>,

    #[serde(rename = "expiry")]
    pub expiry: DateTime<Utc>,
}

impl StoredCredential {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expiry - Duration::seconds(EXPIRY_LEEWAY_SECS) > now
    }
}

/// Loads the cached credential.
///
/// A missing, unreadable, or malformed cache file is treated as an absent
/// credential so the caller falls through to refresh or re-authorization.
pub fn load(path: &Path) -> Option<StoredCredential> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            eprintln!(
                "Ignoring unreadable credential cache {}: {}",
                path.display(),
                e
            );
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(credential) => Some(credential),
        Err(e) => {
            eprintln!(
                "Ignoring malformed credential cache {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Persists the credential, overwriting any prior contents.
pub fn store(path: &Path, credential: &StoredCredential) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(credential)?)?;
    Ok(())
}

/// Removes the cache file. An already absent file is not an error.
pub fn delete(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Io(e)),
    }
}
