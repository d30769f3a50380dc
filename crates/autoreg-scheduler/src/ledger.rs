//! Processed-event ledger: one record per event that reached a terminal state.
//! Saved as a single JSON document after every mutation; human-readable.
//!
//! Older installs stored a flat array of event ids. Such a file is promoted on
//! load to `ImportedLegacy` records and rewritten in the record form on the
//! next save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use autoreg_core::error::{AutoRegError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Success,
    FatalApiError,
    FatalAlreadyRegistered,
    FatalReservationConflict,
    FailureWindowExpired,
    ImportedLegacy,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordStatus::Success => "SUCCESS",
            RecordStatus::FatalApiError => "FATAL_API_ERROR",
            RecordStatus::FatalAlreadyRegistered => "FATAL_ALREADY_REGISTERED",
            RecordStatus::FatalReservationConflict => "FATAL_RESERVATION_CONFLICT",
            RecordStatus::FailureWindowExpired => "FAILURE_WINDOW_EXPIRED",
            RecordStatus::ImportedLegacy => "IMPORTED_LEGACY",
        };
        f.write_str(s)
    }
}

/// Persistent outcome of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub event_id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registration_open_time: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attempts_made: u32,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedRecord {
    /// Record promoted from a legacy id-only ledger.
    pub fn legacy(event_id: &str, processed_at: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.to_string(),
            class_name: None,
            event_time: None,
            registration_open_time: None,
            status: RecordStatus::ImportedLegacy,
            message: "Imported from legacy processed-id list".into(),
            attempts_made: 0,
            processed_at,
        }
    }
}

/// On-disk shapes, newest first.
#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerDocument {
    Records(Vec<ProcessedRecord>),
    LegacyIds(Vec<String>),
}

/// File-backed ledger. Exclusively owned by the scheduling loop.
pub struct Ledger {
    path: PathBuf,
    records: Vec<ProcessedRecord>,
    /// event_id → position in `records`.
    index: HashMap<String, usize>,
    /// Last save failed; memory is ahead of disk.
    dirty: bool,
}

impl Ledger {
    /// Empty ledger that will persist to `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            index: HashMap::new(),
            dirty: false,
        }
    }

    /// Load from `path`. A missing file yields an empty ledger; an unreadable
    /// or corrupt file is moved aside to `<name>.corrupt` and the ledger starts
    /// empty.
    pub fn load(path: &Path) -> Self {
        let mut ledger = Self::new(path);
        if !path.exists() {
            tracing::info!("📒 No ledger at {}, starting empty", path.display());
            return ledger;
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(AutoRegError::from)
            .and_then(|json| serde_json::from_str::<LedgerDocument>(&json).map_err(AutoRegError::from));

        match parsed {
            Ok(LedgerDocument::Records(records)) => {
                for record in records {
                    ledger.insert_in_memory(record);
                }
                tracing::info!("📒 Loaded {} processed events from {}", ledger.len(), path.display());
            }
            Ok(LedgerDocument::LegacyIds(ids)) => {
                let now = Utc::now();
                for id in ids {
                    ledger.insert_in_memory(ProcessedRecord::legacy(&id, now));
                }
                tracing::info!(
                    "📒 Imported {} legacy event ids from {}",
                    ledger.len(),
                    path.display()
                );
            }
            Err(e) => {
                let aside = corrupt_path(path);
                tracing::error!(
                    "❌ Ledger {} unreadable ({e}); moving it to {} and starting empty",
                    path.display(),
                    aside.display()
                );
                if let Err(e) = std::fs::rename(path, &aside) {
                    tracing::warn!("⚠️ Could not move corrupt ledger aside: {e}");
                }
            }
        }
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.index.contains_key(event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<&ProcessedRecord> {
        self.index.get(event_id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[ProcessedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the record for `record.event_id`, then save. The
    /// caller stamps `processed_at`. The in-memory ledger is updated even when
    /// the save fails; the error only reports the persistence failure.
    pub fn upsert(&mut self, record: ProcessedRecord) -> Result<()> {
        if self.contains(&record.event_id) {
            tracing::warn!(
                "📒 Event {} already recorded, updating in place ({})",
                record.event_id,
                record.status
            );
        }
        self.insert_in_memory(record);
        let saved = self.save();
        self.dirty = saved.is_err();
        saved
    }

    /// Save only if a previous save failed.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.save()?;
        self.dirty = false;
        tracing::info!("💾 Ledger flushed to {}", self.path.display());
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the full record list to disk (temp file + rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| AutoRegError::Persistence(format!("Create dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| AutoRegError::Persistence(format!("Serialize error: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| AutoRegError::Persistence(format!("Write error: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| AutoRegError::Persistence(format!("Rename error: {e}")))?;
        tracing::debug!("💾 Saved {} ledger records to {}", self.records.len(), self.path.display());
        Ok(())
    }

    fn insert_in_memory(&mut self, record: ProcessedRecord) {
        match self.index.get(&record.event_id) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(record.event_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if self.dirty
            && let Err(e) = self.save()
        {
            tracing::error!("❌ Final ledger flush failed, {} records unsaved: {e}", self.records.len());
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger".into());
    name.push(".corrupt");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, status: RecordStatus) -> ProcessedRecord {
        ProcessedRecord {
            event_id: id.into(),
            class_name: Some("Intermediate Open Play".into()),
            event_time: Some(Utc::now()),
            registration_open_time: Some(Utc::now()),
            status,
            message: "ok".into(),
            attempts_made: 1,
            processed_at: processed_at(),
        }
    }

    fn processed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_upsert_then_contains_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::load(&path);
        assert!(ledger.is_empty());

        ledger.upsert(record("evt-1", RecordStatus::Success)).unwrap();
        assert!(ledger.contains("evt-1"));
        assert!(!ledger.contains("evt-2"));
        assert_eq!(ledger.get("evt-1").unwrap().processed_at, processed_at());

        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("evt-1").unwrap().status, RecordStatus::Success);
        assert_eq!(reloaded.get("evt-1").unwrap().processed_at, processed_at());
    }

    #[test]
    fn test_upsert_replaces_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::new(&dir.path().join("ledger.json"));
        ledger.upsert(record("evt-1", RecordStatus::FailureWindowExpired)).unwrap();
        ledger.upsert(record("evt-1", RecordStatus::Success)).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("evt-1").unwrap().status, RecordStatus::Success);
    }

    #[test]
    fn test_legacy_id_list_is_imported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_event_ids.json");
        std::fs::write(&path, r#"["ZXhlcnA6MzMy", "ZXhlcnA6NDQ0"]"#).unwrap();

        let ledger = Ledger::load(&path);
        assert_eq!(ledger.len(), 2);
        for id in ["ZXhlcnA6MzMy", "ZXhlcnA6NDQ0"] {
            assert!(ledger.contains(id));
            let rec = ledger.get(id).unwrap();
            assert_eq!(rec.status, RecordStatus::ImportedLegacy);
            assert!(rec.event_time.is_none());
            assert!(rec.registration_open_time.is_none());
        }
    }

    #[test]
    fn test_legacy_file_rewritten_as_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"["a"]"#).unwrap();

        let mut ledger = Ledger::load(&path);
        ledger.upsert(record("b", RecordStatus::Success)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let items = raw.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["status"], "IMPORTED_LEGACY");
        assert_eq!(items[1]["status"], "SUCCESS");
        assert_eq!(items[1]["event_id"], "b");
    }

    #[test]
    fn test_empty_array_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(Ledger::load(&path).is_empty());
    }

    #[test]
    fn test_corrupt_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
        assert!(!path.exists());
        assert!(dir.path().join("ledger.json.corrupt").exists());
    }

    #[test]
    fn test_save_failure_keeps_memory_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join("ledger.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let mut ledger = Ledger::new(&path);
        let result = ledger.upsert(record("evt-1", RecordStatus::Success));
        assert!(matches!(result, Err(AutoRegError::Persistence(_))));
        assert!(ledger.contains("evt-1"));
        assert!(ledger.is_dirty());

        std::fs::remove_dir_all(&path).unwrap();
        ledger.flush().unwrap();
        assert!(!ledger.is_dirty());
        assert!(Ledger::load(&path).contains("evt-1"));
    }

    #[test]
    fn test_dirty_ledger_saved_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let mut ledger = Ledger::new(&path);
        assert!(ledger.upsert(record("evt-1", RecordStatus::Success)).is_err());
        assert!(ledger.is_dirty());

        std::fs::remove_dir_all(&path).unwrap();
        drop(ledger);
        assert!(Ledger::load(&path).contains("evt-1"));
    }

    #[test]
    fn test_dirty_ledger_saved_while_unwinding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let mut ledger = Ledger::new(&path);
        assert!(ledger.upsert(record("evt-1", RecordStatus::Success)).is_err());
        std::fs::remove_dir_all(&path).unwrap();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _owned = ledger;
            panic!("loop crashed");
        }));
        assert!(unwound.is_err());
        assert!(Ledger::load(&path).contains("evt-1"));
    }

    #[test]
    fn test_clean_ledger_not_rewritten_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = Ledger::new(&path);
        ledger.upsert(record("evt-1", RecordStatus::Success)).unwrap();
        std::fs::remove_file(&path).unwrap();

        drop(ledger);
        assert!(!path.exists());
    }

    #[test]
    fn test_status_serialized_screaming_snake() {
        let json = serde_json::to_string(&RecordStatus::FatalReservationConflict).unwrap();
        assert_eq!(json, "\"FATAL_RESERVATION_CONFLICT\"");
        assert_eq!(RecordStatus::FailureWindowExpired.to_string(), "FAILURE_WINDOW_EXPIRED");
    }
}
