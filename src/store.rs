use std::fs;
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::Snapshot;
use crate::error::TrackerError;

pub const CACHE_SCHEMA_VERSION: u32 = 1;
const SNAPSHOT_FILE: &str = "snapshot.json.gz";
const DEBUG_DUMP_FILE: &str = "snapshot.json";

/// Durable home of the reconciled catalog snapshot.
pub trait CacheStore {
    /// `Ok(None)` when nothing usable has been saved yet.
    fn load(&self) -> Result<Option<Snapshot>, TrackerError>;
    /// Replaces the stored snapshot as a whole.
    fn save(&self, snapshot: &Snapshot) -> Result<(), TrackerError>;
    /// Returns whether anything was removed.
    fn clear(&self) -> Result<bool, TrackerError>;
}

#[derive(Debug, Deserialize)]
pub struct CacheFile {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    snapshot: &'a Snapshot,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    cache_root: Utf8PathBuf,
    debug_dump: bool,
}

impl SnapshotStore {
    pub fn new() -> Result<Self, TrackerError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("gw2-achievements"))
                    .ok()
            })
            .ok_or_else(|| {
                TrackerError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self::new_with_root(cache_root))
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self {
            cache_root,
            debug_dump: false,
        }
    }

    /// Also write an uncompressed, pretty-printed copy next to the snapshot.
    pub fn with_debug_dump(mut self, enabled: bool) -> Self {
        self.debug_dump = enabled;
        self
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn snapshot_path(&self) -> Utf8PathBuf {
        self.cache_root.join(SNAPSHOT_FILE)
    }

    pub fn debug_dump_path(&self) -> Utf8PathBuf {
        self.cache_root.join(DEBUG_DUMP_FILE)
    }

    pub fn load_file(&self) -> Result<Option<CacheFile>, TrackerError> {
        let path = self.snapshot_path();
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| TrackerError::Filesystem(format!("open {path}: {err}")))?;
        let reader = BufReader::new(GzDecoder::new(file));
        let cache: CacheFile = serde_json::from_reader(reader)
            .map_err(|err| TrackerError::Cache(format!("{path}: {err}")))?;
        if cache.schema_version != CACHE_SCHEMA_VERSION {
            tracing::warn!(
                found = cache.schema_version,
                expected = CACHE_SCHEMA_VERSION,
                "ignoring snapshot written with another schema version"
            );
            return Ok(None);
        }
        Ok(Some(cache))
    }

    fn write_debug_dump(&self, snapshot: &Snapshot) -> Result<(), TrackerError> {
        let content = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| TrackerError::Cache(err.to_string()))?;
        write_bytes_atomic(&self.debug_dump_path(), &content)
    }
}

impl CacheStore for SnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, TrackerError> {
        Ok(self.load_file()?.map(|cache| cache.snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), TrackerError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix(".snapshot")
            .tempfile_in(self.cache_root.as_std_path())
            .map_err(|err| TrackerError::Filesystem(err.to_string()))?;

        let cache = CacheFileRef {
            schema_version: CACHE_SCHEMA_VERSION,
            saved_at: Utc::now(),
            snapshot,
        };
        {
            let mut encoder =
                GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
            serde_json::to_writer(&mut encoder, &cache)
                .map_err(|err| TrackerError::Cache(err.to_string()))?;
            let mut writer = encoder
                .finish()
                .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
            writer
                .flush()
                .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
        }

        let path = self.snapshot_path();
        temp.persist(path.as_std_path())
            .map_err(|err| TrackerError::Filesystem(err.to_string()))?;

        // snapshot already persisted
        if self.debug_dump
            && let Err(err) = self.write_debug_dump(snapshot)
        {
            tracing::warn!(error = %err, path = %self.debug_dump_path(), "failed to write debug dump");
        }
        Ok(())
    }

    fn clear(&self) -> Result<bool, TrackerError> {
        let mut removed = false;
        for path in [self.snapshot_path(), self.debug_dump_path()] {
            if path.as_std_path().exists() {
                fs::remove_file(path.as_std_path())
                    .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
                removed = true;
            }
        }
        Ok(removed)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), TrackerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| TrackerError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = SnapshotStore::new_with_root(Utf8PathBuf::from("/tmp/gw2"));
        assert!(store.snapshot_path().ends_with("snapshot.json.gz"));
        assert!(store.debug_dump_path().ends_with("snapshot.json"));
        assert_eq!(store.cache_root(), "/tmp/gw2");
    }
}
