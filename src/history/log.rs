// History log - newest-first bounded journal persisted as JSON

use super::error::HistoryError;
use super::types::{CommandKind, HistoryEntry};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default number of entries kept
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded history of executed commands and snippets
///
/// The front of the deque is the newest entry. Every mutation rewrites the
/// whole file; a failed write is logged and the in-memory sequence stays
/// authoritative for the rest of the process lifetime.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    /// Load history from disk, truncated to `capacity`
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let capacity = capacity.max(1);
        let mut entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "history unreadable, starting empty");
                VecDeque::new()
            }
        };
        entries.truncate(capacity);
        info!(path = %path.display(), entries = entries.len(), capacity, "history loaded");
        Self {
            path,
            capacity,
            entries,
        }
    }

    fn load(path: &Path) -> Result<VecDeque<HistoryEntry>, HistoryError> {
        if !path.exists() {
            return Ok(VecDeque::new());
        }
        let content =
            fs::read_to_string(path).map_err(|e| HistoryError::LoadFailed(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| HistoryError::LoadFailed(e.to_string()))
    }

    /// Record a finished request at the front, evicting the oldest
    pub fn add(&mut self, command_text: impl Into<String>, kind: CommandKind, exit_code: Option<i32>) {
        self.push(HistoryEntry::new(command_text, kind, exit_code));
    }

    /// Insert an already-built entry at the front
    pub fn push(&mut self, entry: HistoryEntry) {
        debug!(kind = %entry.kind, exit_code = ?entry.exit_code, "recording history entry");
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        self.persist_soft();
    }

    /// Most recent entries, newest first, optionally filtered by kind
    pub fn get(&self, limit: usize, kind: Option<CommandKind>) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        info!("history cleared");
        self.persist_soft();
    }

    /// Change the capacity, evicting the oldest entries if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }
        self.capacity = capacity;
        if self.entries.len() > capacity {
            self.entries.truncate(capacity);
            self.persist_soft();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn persist(&self) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| HistoryError::StoreFailed(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| HistoryError::StoreFailed(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| HistoryError::StoreFailed(e.to_string()))?;
        debug!("Persisted {} history entries", self.entries.len());
        Ok(())
    }

    fn persist_soft(&self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "history kept in memory only");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log(capacity: usize) -> (tempfile::TempDir, HistoryLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::open(dir.path().join("history.json"), capacity);
        (dir, log)
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (_dir, mut log) = temp_log(2);
        log.add("A", CommandKind::Terminal, Some(0));
        log.add("B", CommandKind::Terminal, Some(0));
        log.add("C", CommandKind::Terminal, Some(0));

        let texts: Vec<_> = log.get(10, None).into_iter().map(|e| e.command_text).collect();
        assert_eq!(texts, vec!["C", "B"]);
    }

    #[test]
    fn test_get_filters_and_limits() {
        let (_dir, mut log) = temp_log(DEFAULT_CAPACITY);
        log.add("ls", CommandKind::Terminal, Some(0));
        log.add("1+1", CommandKind::Code, Some(0));
        log.add("pwd", CommandKind::Terminal, Some(0));
        log.add("2+2", CommandKind::Code, Some(1));

        let code = log.get(10, Some(CommandKind::Code));
        assert_eq!(code.len(), 2);
        assert_eq!(code[0].command_text, "2+2");

        let latest = log.get(1, None);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].command_text, "2+2");
    }

    #[test]
    fn test_round_trip_preserves_order_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut log = HistoryLog::open(&path, 10);
        log.add("first", CommandKind::Terminal, Some(2));
        log.add("second", CommandKind::Code, None);
        let before = log.get(10, None);

        let reloaded = HistoryLog::open(&path, 10);
        assert_eq!(reloaded.get(10, None), before);

        let smaller = HistoryLog::open(&path, 1);
        assert_eq!(smaller.get(10, None), before[..1].to_vec());
    }

    #[test]
    fn test_clear_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut log = HistoryLog::open(&path, 10);
        log.add("ls", CommandKind::Terminal, Some(0));
        log.clear();

        assert!(log.is_empty());
        assert!(HistoryLog::open(&path, 10).is_empty());
    }

    #[test]
    fn test_unwritable_storage_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let mut log = HistoryLog::open(blocker.join("history.json"), 5);
        log.add("echo hi", CommandKind::Terminal, Some(0));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_shrinking_capacity() {
        let (_dir, mut log) = temp_log(5);
        for i in 0..5 {
            log.add(format!("cmd{i}"), CommandKind::Terminal, Some(0));
        }
        log.set_capacity(2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(5, None)[0].command_text, "cmd4");
    }
}
