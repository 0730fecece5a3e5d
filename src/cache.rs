//! Single-slot JSON file cache for the most recent scrape.
//!
//! Exactly one [`QueryResult`] is stored at a time; every successful scrape
//! overwrites it. Readers treat a missing, corrupt or incomplete file as an
//! empty cache. Concurrent writers are last-writer-wins.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::portal::{Selection, SelectionValues, UsageRecord};

/// Timestamp format of `info.scrape_time` (local time, no zone).
pub const SCRAPE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One complete scrape of one room. This is the unit that gets cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub selection: Selection,
    /// Server-side option values, kept so a refresh can skip name resolution.
    pub values: SelectionValues,
    pub scrape_time: NaiveDateTime,
    pub remaining_balance: Option<String>,
    pub records: Vec<UsageRecord>,
}

impl QueryResult {
    pub fn scrape_time_str(&self) -> String {
        self.scrape_time.format(SCRAPE_TIME_FORMAT).to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file {} is not accessible", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache file {} is corrupt at '{at}'", path.display())]
    Corrupt {
        path: PathBuf,
        at: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode cache entry")]
    Encode(#[source] serde_json::Error),
}

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    info: CacheInfo,
    records: Vec<UsageRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheInfo {
    building: String,
    floor: String,
    room: String,
    building_value: String,
    floor_value: String,
    room_value: String,
    #[serde(with = "scrape_time_format")]
    scrape_time: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remaining_electricity: Option<String>,
}

mod scrape_time_format {
    use super::SCRAPE_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&value.format(SCRAPE_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, SCRAPE_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

impl From<&QueryResult> for CacheFile {
    fn from(result: &QueryResult) -> Self {
        Self {
            info: CacheInfo {
                building: result.selection.building.clone(),
                floor: result.selection.floor.clone(),
                room: result.selection.room.clone(),
                building_value: result.values.building.clone(),
                floor_value: result.values.floor.clone(),
                room_value: result.values.room.clone(),
                scrape_time: result.scrape_time,
                remaining_electricity: result.remaining_balance.clone(),
            },
            records: result.records.clone(),
        }
    }
}

impl From<CacheFile> for QueryResult {
    fn from(file: CacheFile) -> Self {
        let info = file.info;
        Self {
            selection: Selection::new(info.building, info.floor, info.room),
            values: SelectionValues {
                building: info.building_value,
                floor: info.floor_value,
                room: info.room_value,
            },
            scrape_time: info.scrape_time,
            remaining_balance: info.remaining_electricity,
            records: file.records,
        }
    }
}

/// True iff `entry` is for exactly `selection` and younger than `ttl` at `now`.
pub fn is_fresh(
    entry: &QueryResult,
    selection: &Selection,
    now: NaiveDateTime,
    ttl: Duration,
) -> bool {
    if entry.selection != *selection {
        return false;
    }
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    now - entry.scrape_time < ttl
}

/// Handle to the cache file.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_fresh(&self, entry: &QueryResult, selection: &Selection, now: NaiveDateTime) -> bool {
        is_fresh(entry, selection, now, self.ttl)
    }

    /// Read the cached entry. Any problem with the file counts as a miss.
    pub async fn read(&self) -> Option<QueryResult> {
        match self.load().await {
            Ok(Some(entry)) => {
                trace!(path = %self.path.display(), selection = %entry.selection, "cache entry loaded");
                Some(entry)
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no cache file");
                None
            }
            Err(e) => {
                let cause = std::error::Error::source(&e).map(ToString::to_string);
                warn!(
                    error = %e,
                    cause = cause.as_deref().unwrap_or("-"),
                    "ignoring unreadable cache"
                );
                None
            }
        }
    }

    async fn load(&self) -> Result<Option<QueryResult>, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let de = &mut serde_json::Deserializer::from_slice(&bytes);
        let file: CacheFile =
            serde_path_to_error::deserialize(de).map_err(|err| CacheError::Corrupt {
                path: self.path.clone(),
                at: err.path().to_string(),
                source: err.into_inner(),
            })?;

        Ok(Some(file.into()))
    }

    /// Replace the cached entry.
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// never observe a half-written file. Each call gets its own temp name;
    /// concurrent writers race only on the rename, and the last one wins.
    pub async fn write(&self, result: &QueryResult) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        CacheFile::from(result)
            .serialize(&mut ser)
            .map_err(CacheError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache.json".into());
        tmp_name.push(format!(".{}.tmp", ulid::Ulid::new()));
        let tmp_path = self.path.with_file_name(tmp_name);

        if let Err(source) = tokio::fs::write(&tmp_path, &buf).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_err(source));
        }
        if let Err(source) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_err(source));
        }

        info!(
            path = %self.path.display(),
            selection = %result.selection,
            records = result.records.len(),
            "cache updated"
        );
        Ok(())
    }
}
