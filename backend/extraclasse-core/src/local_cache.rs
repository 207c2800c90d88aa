// src/local_cache.rs
//! Directory-backed key-value storage: the local fallback copy of the
//! three collections and the configured endpoint URL.
//!
//! Every key is one `<key>.json` file. Slots are independent; a corrupt
//! slot is logged, removed and reported as missing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::model::{ActivityType, MonthlyReport, Person};
use crate::serde_lenient::decode_records;
use crate::state::AppData;

pub const TEACHERS_KEY: &str = "teachers";
pub const ACTIVITY_TYPES_KEY: &str = "activityTypes";
pub const REPORTS_KEY: &str = "reports";
pub const ENDPOINT_KEY: &str = "GOOGLE_SCRIPT_URL";

pub const DEFAULT_ENDPOINT: &str = "https://script.google.com/macros/s/AKfycbyJiphkyUooRoSMm9hGTwzZCQLqa8EbWX_KiSjCXS2G-7bZshIa4mWsM_7WyvvHvgvRjQ/exec";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("Invalid endpoint URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

fn io_context<S: Into<String>>(source: std::io::Error, context: S) -> CacheError {
    CacheError::Io {
        source,
        context: context.into(),
    }
}

/// What the cache held at startup; `None` means the slot was absent.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    pub teachers: Option<Vec<Person>>,
    pub activity_types: Option<Vec<ActivityType>>,
    pub reports: Option<Vec<MonthlyReport>>,
}

impl LocalSnapshot {
    pub fn is_empty(&self) -> bool {
        self.teachers.is_none() && self.activity_types.is_none() && self.reports.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
    default_endpoint: Url,
}

impl LocalStorage {
    pub fn open(dir: impl Into<PathBuf>, default_endpoint: Url) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| io_context(e, format!("Failed to create storage directory: {:?}", dir)))?;
        info!("Local storage at {:?}", dir);
        Ok(Self {
            dir,
            default_endpoint,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn write_slot<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let path = self.slot_path(key);
        let json_string = serde_json::to_string_pretty(value)?;
        let mut file = File::create(&path)
            .map_err(|e| io_context(e, format!("Failed to create cache file: {:?}", path)))?;
        file.write_all(json_string.as_bytes())
            .map_err(|e| io_context(e, format!("Failed to write to cache file: {:?}", path)))?;
        debug!("Wrote local slot {}", key);
        Ok(())
    }

    /// Raw slot content; unreadable JSON is removed and treated as absent.
    fn read_slot(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.slot_path(key);
        if !path.exists() {
            debug!("Local slot {} is empty", key);
            return Ok(None);
        }
        let json_string = fs::read_to_string(&path)
            .map_err(|e| io_context(e, format!("Failed to read cache file: {:?}", path)))?;
        match serde_json::from_str::<Value>(&json_string) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.discard(key, &path, &e.to_string());
                Ok(None)
            }
        }
    }

    fn discard(&self, key: &str, path: &Path, reason: &str) {
        warn!(
            "Local slot {} is corrupt ({}). Removing {:?}.",
            key, reason, path
        );
        if let Err(remove_err) = fs::remove_file(path) {
            error!("Failed to remove corrupt cache file {:?}: {}", path, remove_err);
        }
    }

    fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>, CacheError> {
        match self.read_slot(key)? {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(decode_records(items))),
            Some(other) => {
                let reason = format!("expected a list, found {}", value_kind(&other));
                self.discard(key, &self.slot_path(key), &reason);
                Ok(None)
            }
        }
    }

    pub fn read_snapshot(&self) -> Result<LocalSnapshot, CacheError> {
        Ok(LocalSnapshot {
            teachers: self.read_collection(TEACHERS_KEY)?,
            activity_types: self.read_collection(ACTIVITY_TYPES_KEY)?,
            reports: self.read_collection(REPORTS_KEY)?,
        })
    }

    pub fn write_snapshot(&self, data: &AppData) -> Result<(), CacheError> {
        self.write_slot(TEACHERS_KEY, &data.teachers)?;
        self.write_slot(ACTIVITY_TYPES_KEY, &data.activity_types)?;
        self.write_slot(REPORTS_KEY, &data.reports)?;
        Ok(())
    }

    /// The stored endpoint, or the built-in default when unset or unusable.
    pub fn endpoint_url(&self) -> Result<Url, CacheError> {
        let stored = match self.read_slot(ENDPOINT_KEY)? {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(_) | None => return Ok(self.default_endpoint.clone()),
        };
        match Url::parse(stored.trim()) {
            Ok(url) => Ok(url),
            Err(e) => {
                warn!("Stored endpoint '{}' is not a URL ({}); using default", stored, e);
                Ok(self.default_endpoint.clone())
            }
        }
    }

    pub fn set_endpoint_url(&self, url: &str) -> Result<Url, CacheError> {
        let parsed = Url::parse(url.trim()).map_err(|source| CacheError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        self.write_slot(ENDPOINT_KEY, parsed.as_str())?;
        info!("Endpoint set to {}", parsed);
        Ok(parsed)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
