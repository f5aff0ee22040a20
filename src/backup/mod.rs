//! Backup store.
//!
//! Snapshots the files a failed workflow step could damage: `.env`, the
//! package manifests, `.gitignore`, and the tool state directory, together
//! with a JSON Git snapshot (current branch, status, remote URL, last
//! commit). Snapshots are full or incremental, carry SHA-256 checksums per
//! file and for the snapshot as a whole, and live in an append-front index
//! with bounded retention. Restore refuses to touch the working tree unless
//! verification passes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::git::{GitAdapter, GitStatus};

/// Paths snapshotted by every backup, relative to the repository root.
/// Directories are mirrored recursively.
const BACKUP_TARGETS: &[&str] = &[".env", "package.json", "Cargo.toml", ".gitignore", ".teamflow"];

/// Subdirectories of the state directory that are never snapshotted: the
/// store must not mirror itself, and logs are append-only noise.
const STATE_DIR_EXCLUDES: &[&str] = &["backups", "logs"];

const INDEX_VERSION: u32 = 1;

/// Error type for backup operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index corrupted: {0}")]
    Index(#[from] serde_json::Error),

    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for {id}: expected {expected}, got {actual}")]
    ChecksumMismatch { id: String, expected: String, actual: String },

    #[error("backup {0} is missing its file tree")]
    MissingTree(String),
}

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Kind of snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Full,
    Incremental,
}

/// Kind of one recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One file or directory captured in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the repository root.
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    /// SHA-256 of the content; `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Metadata describing one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub kind: BackupKind,
    /// Operation the backup was taken for, e.g. `start`.
    pub operation: String,
    pub timestamp: String,
    /// Predecessor for incremental records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub based_on_id: Option<String>,
    pub files: Vec<FileEntry>,
    pub total_size: u64,
    /// Whole-snapshot checksum over the captured files.
    pub checksum: String,
}

/// Git state captured alongside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub current_branch: Option<String>,
    pub uncommitted_count: usize,
    pub remote_url: Option<String>,
    pub last_commit: Option<String>,
}

impl GitSnapshot {
    /// Capture the current Git state; absent repo yields an empty snapshot.
    pub fn capture(git: &GitAdapter) -> Self {
        let status = git.status().unwrap_or_else(|_| GitStatus::default());
        Self {
            current_branch: status.current_branch.clone(),
            uncommitted_count: status.uncommitted_count(),
            remote_url: git.remote_url("origin").ok(),
            last_commit: git.last_commit().ok().flatten().map(|c| c.hash),
        }
    }
}

/// On-disk index: `{version, createdAt, backups: [...]}`, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupIndex {
    version: u32,
    created_at: String,
    backups: Vec<BackupRecord>,
}

impl BackupIndex {
    fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            backups: Vec::new(),
        }
    }
}

/// Summary returned by a successful restore.
#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub restored_files: usize,
    pub restored_branch: Option<String>,
}

/// The backup store. Exclusively owns the backup directory and index.
pub struct BackupStore {
    /// Repository root the snapshots are relative to.
    root: PathBuf,
    /// `.teamflow/backups`.
    dir: PathBuf,
    retention: usize,
}

impl BackupStore {
    /// Create a store; the directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>, dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self { root: root.into(), dir: dir.into(), retention: retention.max(1) }
    }

    /// List records, newest first.
    pub fn records(&self) -> BackupResult<Vec<BackupRecord>> {
        Ok(self.load_index()?.backups)
    }

    /// The most recent record, if any.
    pub fn latest(&self) -> BackupResult<Option<BackupRecord>> {
        Ok(self.load_index()?.backups.into_iter().next())
    }

    /// The most recent record taken for a given operation.
    pub fn latest_for_operation(&self, operation: &str) -> BackupResult<Option<BackupRecord>> {
        Ok(self
            .load_index()?
            .backups
            .into_iter()
            .find(|r| r.operation == operation))
    }

    /// Take a full snapshot.
    pub fn create_full(
        &self,
        operation: &str,
        git: Option<&GitAdapter>,
    ) -> BackupResult<BackupRecord> {
        let entries = self.collect_entries()?;
        self.write_snapshot(operation, BackupKind::Full, None, entries, git)
    }

    /// Take an incremental snapshot based on the latest record.
    ///
    /// Includes only files whose checksum (or, for directories, mtime)
    /// differs from the base. Without a predecessor this degrades to a full
    /// snapshot.
    pub fn create_incremental(
        &self,
        operation: &str,
        git: Option<&GitAdapter>,
    ) -> BackupResult<BackupRecord> {
        let Some(base) = self.latest()? else {
            return self.create_full(operation, git);
        };

        let current = self.collect_entries()?;
        let base_by_path: BTreeMap<&str, &FileEntry> =
            base.files.iter().map(|e| (e.path.as_str(), e)).collect();

        let changed: Vec<FileEntry> = current
            .into_iter()
            .filter(|entry| match base_by_path.get(entry.path.as_str()) {
                None => true,
                Some(prev) => match entry.kind {
                    EntryKind::File => entry.checksum != prev.checksum,
                    EntryKind::Dir => entry.mtime != prev.mtime,
                },
            })
            .collect();

        self.write_snapshot(operation, BackupKind::Incremental, Some(base.id), changed, git)
    }

    /// Verify a snapshot: recompute the whole-snapshot checksum from the
    /// stored tree and compare. An incremental whose predecessor is gone is
    /// degraded to full before verification.
    pub fn verify(&self, id: &str) -> BackupResult<()> {
        let mut index = self.load_index()?;
        let known_ids: Vec<String> = index.backups.iter().map(|r| r.id.clone()).collect();

        let record = index
            .backups
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| BackupError::NotFound(id.to_string()))?;

        if record.kind == BackupKind::Incremental {
            let base_present =
                record.based_on_id.as_ref().is_some_and(|base| known_ids.contains(base));
            if !base_present {
                tracing::warn!(id, "incremental base missing; degrading record to full");
                record.kind = BackupKind::Full;
                record.based_on_id = None;
                let record = record.clone();
                self.save_index(&index)?;
                return self.verify_record(&record);
            }
        }

        let record = record.clone();
        self.verify_record(&record)
    }

    fn verify_record(&self, record: &BackupRecord) -> BackupResult<()> {
        let files_dir = self.dir.join(&record.id).join("files");
        if !record.files.is_empty() && !files_dir.exists() {
            return Err(BackupError::MissingTree(record.id.clone()));
        }

        let actual = calculate_directory_checksum(&files_dir)?;
        if actual == record.checksum {
            Ok(())
        } else {
            Err(BackupError::ChecksumMismatch {
                id: record.id.clone(),
                expected: record.checksum.clone(),
                actual,
            })
        }
    }

    /// Restore a snapshot into the working tree.
    ///
    /// The record chain (base full snapshot, then each incremental up to the
    /// target) is verified first; any mismatch aborts before a single file
    /// is written. When a Git snapshot was captured, the recorded branch is
    /// checked out again, best effort.
    pub fn restore(&self, id: &str, git: Option<&GitAdapter>) -> BackupResult<RestoreSummary> {
        let chain = self.resolve_chain(id)?;
        for record in &chain {
            self.verify_record(record)?;
        }

        let mut summary = RestoreSummary::default();
        // Oldest first, so newer records overwrite.
        for record in chain.iter().rev() {
            let files_dir = self.dir.join(&record.id).join("files");
            for entry in &record.files {
                let stored = files_dir.join(&entry.path);
                let target = self.root.join(&entry.path);
                match entry.kind {
                    EntryKind::Dir => {
                        std::fs::create_dir_all(&target)?;
                    }
                    EntryKind::File => {
                        if let Some(parent) = target.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        std::fs::copy(&stored, &target)?;
                        summary.restored_files += 1;
                    }
                }
            }
        }

        if let Some(git) = git {
            if let Some(snapshot) = self.git_snapshot(id)? {
                if let Some(branch) = snapshot.current_branch {
                    if git.branch_exists(&branch) && git.checkout(&branch).is_ok() {
                        summary.restored_branch = Some(branch);
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Load the Git snapshot stored with a record, if any.
    pub fn git_snapshot(&self, id: &str) -> BackupResult<Option<GitSnapshot>> {
        let path = self.dir.join(id).join("git-info.json");
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn load_index(&self) -> BackupResult<BackupIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(BackupIndex::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_index(&self, index: &BackupIndex) -> BackupResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.index_path(), serde_json::to_string_pretty(index)?)?;
        Ok(())
    }

    /// Enumerate current target entries with sizes, mtimes and checksums.
    fn collect_entries(&self) -> BackupResult<Vec<FileEntry>> {
        let mut entries = Vec::new();

        for target in BACKUP_TARGETS {
            let path = self.root.join(target);
            if !path.exists() {
                continue;
            }
            if path.is_file() {
                entries.push(self.file_entry(&path, target)?);
            } else if path.is_dir() {
                for item in WalkDir::new(&path).sort_by_file_name() {
                    let item = item.map_err(|e| {
                        BackupError::Io(e.into_io_error().unwrap_or_else(|| {
                            std::io::Error::other("walkdir error without io cause")
                        }))
                    })?;
                    let rel = item
                        .path()
                        .strip_prefix(&self.root)
                        .unwrap_or(item.path())
                        .to_string_lossy()
                        .replace('\\', "/");
                    if self.is_excluded(&rel) {
                        continue;
                    }
                    if item.file_type().is_dir() {
                        let meta = item.metadata().map_err(|e| {
                            BackupError::Io(e.into_io_error().unwrap_or_else(|| {
                                std::io::Error::other("metadata error without io cause")
                            }))
                        })?;
                        entries.push(FileEntry {
                            path: rel,
                            kind: EntryKind::Dir,
                            size: 0,
                            mtime: mtime_secs(&meta),
                            checksum: None,
                        });
                    } else if item.file_type().is_file() {
                        entries.push(self.file_entry(item.path(), &rel)?);
                    }
                }
            }
        }

        Ok(entries)
    }

    fn is_excluded(&self, rel: &str) -> bool {
        STATE_DIR_EXCLUDES
            .iter()
            .any(|ex| {
                let prefix = format!("{}/{ex}", crate::core::STATE_DIR_NAME);
                rel == prefix || rel.starts_with(&format!("{prefix}/"))
            })
    }

    fn file_entry(&self, path: &Path, rel: &str) -> BackupResult<FileEntry> {
        let meta = std::fs::metadata(path)?;
        let content = std::fs::read(path)?;
        Ok(FileEntry {
            path: rel.to_string(),
            kind: EntryKind::File,
            size: meta.len(),
            mtime: mtime_secs(&meta),
            checksum: Some(sha256_hex(&content)),
        })
    }

    fn write_snapshot(
        &self,
        operation: &str,
        kind: BackupKind,
        based_on_id: Option<String>,
        entries: Vec<FileEntry>,
        git: Option<&GitAdapter>,
    ) -> BackupResult<BackupRecord> {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let timestamp = Utc::now();
        let id = format!("{}-{:03}-{}", timestamp.format("%Y%m%dT%H%M%S%3f"), seq, operation);
        let snapshot_dir = self.dir.join(&id);
        let files_dir = snapshot_dir.join("files");
        std::fs::create_dir_all(&files_dir)?;

        let mut total_size = 0u64;
        for entry in &entries {
            let target = files_dir.join(&entry.path);
            match entry.kind {
                EntryKind::Dir => {
                    std::fs::create_dir_all(&target)?;
                }
                EntryKind::File => {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::copy(self.root.join(&entry.path), &target)?;
                    total_size += entry.size;
                }
            }
        }

        let checksum = calculate_directory_checksum(&files_dir)?;
        let record = BackupRecord {
            id: id.clone(),
            kind,
            operation: operation.to_string(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            based_on_id,
            files: entries,
            total_size,
            checksum,
        };

        std::fs::write(
            snapshot_dir.join("backup-info.json"),
            serde_json::to_string_pretty(&record)?,
        )?;

        if let Some(git) = git {
            let snapshot = GitSnapshot::capture(git);
            std::fs::write(
                snapshot_dir.join("git-info.json"),
                serde_json::to_string_pretty(&snapshot)?,
            )?;
        }

        let mut index = self.load_index()?;
        index.backups.insert(0, record.clone());
        while index.backups.len() > self.retention {
            if let Some(dropped) = index.backups.pop() {
                let _ = std::fs::remove_dir_all(self.dir.join(&dropped.id));
                tracing::debug!(id = %dropped.id, "dropped backup past retention");
            }
        }
        self.save_index(&index)?;

        tracing::info!(id = %id, ?kind, operation, "backup created");
        Ok(record)
    }

    /// Records from `id` back to its base full snapshot, target first.
    fn resolve_chain(&self, id: &str) -> BackupResult<Vec<BackupRecord>> {
        let index = self.load_index()?;
        let mut chain = Vec::new();
        let mut cursor = Some(id.to_string());

        while let Some(current) = cursor {
            let record = index
                .backups
                .iter()
                .find(|r| r.id == current)
                .cloned()
                .ok_or(BackupError::NotFound(current))?;
            cursor = match record.kind {
                BackupKind::Full => None,
                BackupKind::Incremental => record.based_on_id.clone(),
            };
            chain.push(record);
        }

        Ok(chain)
    }
}

/// Compute the canonical checksum of a directory tree.
///
/// The digest covers `"<relpath>:<content>"` for every file, in sorted
/// relative-path order, so it is stable across platforms and repeated calls
/// on unchanged content.
pub fn calculate_directory_checksum(dir: &Path) -> BackupResult<String> {
    let mut files = Vec::new();
    if dir.exists() {
        for item in WalkDir::new(dir).sort_by_file_name() {
            let item = item.map_err(|e| {
                BackupError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walkdir error without io cause")),
                )
            })?;
            if item.file_type().is_file() {
                let rel = item
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(item.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push((rel, item.path().to_path_buf()));
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel, path) in files {
        hasher.update(rel.as_bytes());
        hasher.update(b":");
        hasher.update(std::fs::read(&path)?);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a byte slice as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn mtime_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> BackupStore {
        BackupStore::new(dir, dir.join(".teamflow").join("backups"), 10)
    }

    fn seed_project(root: &Path) {
        std::fs::write(root.join(".env"), "GITHUB_TOKEN=x\n").unwrap();
        std::fs::write(root.join(".gitignore"), "target/\n").unwrap();
        std::fs::write(root.join("package.json"), "{\"name\":\"demo\"}\n").unwrap();
        let state = root.join(".teamflow");
        std::fs::create_dir_all(state.join("state")).unwrap();
        std::fs::write(state.join("config.json"), "{}\n").unwrap();
    }

    #[test]
    fn test_full_backup_captures_targets() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        let record = store.create_full("start", None).unwrap();
        assert_eq!(record.kind, BackupKind::Full);
        let paths: Vec<_> = record.files.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&".env"));
        assert!(paths.contains(&".gitignore"));
        assert!(paths.contains(&"package.json"));
        assert!(paths.iter().any(|p| p.starts_with(".teamflow/")));
        assert!(record.total_size > 0);
        assert_eq!(record.checksum.len(), 64);
    }

    #[test]
    fn test_backup_dir_is_not_self_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        store.create_full("start", None).unwrap();
        let second = store.create_full("start", None).unwrap();
        assert!(
            second.files.iter().all(|f| !f.path.contains("backups")),
            "must not snapshot its own storage"
        );
    }

    #[test]
    fn test_no_change_incremental_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        let full = store.create_full("start", None).unwrap();
        let inc = store.create_incremental("start", None).unwrap();
        assert_eq!(inc.kind, BackupKind::Incremental);
        assert_eq!(inc.based_on_id.as_deref(), Some(full.id.as_str()));
        let files: Vec<_> =
            inc.files.iter().filter(|f| f.kind == EntryKind::File).collect();
        assert!(files.is_empty(), "unexpected entries: {files:?}");
    }

    #[test]
    fn test_incremental_captures_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        store.create_full("start", None).unwrap();
        std::fs::write(dir.path().join(".env"), "GITHUB_TOKEN=y\n").unwrap();
        let inc = store.create_incremental("start", None).unwrap();

        let changed: Vec<_> = inc
            .files
            .iter()
            .filter(|f| f.kind == EntryKind::File)
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(changed, vec![".env"]);
    }

    #[test]
    fn test_incremental_without_base_degrades_to_full() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        let record = store.create_incremental("start", None).unwrap();
        assert_eq!(record.kind, BackupKind::Full);
    }

    #[test]
    fn test_checksum_stability() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), "beta").unwrap();

        let first = calculate_directory_checksum(dir.path()).unwrap();
        let second = calculate_directory_checksum(dir.path()).unwrap();
        assert_eq!(first, second);

        std::fs::write(dir.path().join("a.txt"), "alpha2").unwrap();
        let third = calculate_directory_checksum(dir.path()).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_verify_and_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        let record = store.create_full("start", None).unwrap();
        store.verify(&record.id).unwrap();

        // Damage the working tree, then restore.
        std::fs::write(dir.path().join(".env"), "GITHUB_TOKEN=corrupted\n").unwrap();
        std::fs::remove_file(dir.path().join(".gitignore")).unwrap();

        let summary = store.restore(&record.id, None).unwrap();
        assert!(summary.restored_files >= 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env")).unwrap(),
            "GITHUB_TOKEN=x\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "target/\n"
        );
    }

    #[test]
    fn test_restore_from_incremental_applies_chain() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        store.create_full("start", None).unwrap();
        std::fs::write(dir.path().join(".env"), "GITHUB_TOKEN=v2\n").unwrap();
        let inc = store.create_incremental("start", None).unwrap();

        std::fs::write(dir.path().join(".env"), "GITHUB_TOKEN=broken\n").unwrap();
        std::fs::write(dir.path().join("package.json"), "broken\n").unwrap();

        store.restore(&inc.id, None).unwrap();
        // Incremental layer wins for .env; base layer restores package.json.
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env")).unwrap(),
            "GITHUB_TOKEN=v2\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("package.json")).unwrap(),
            "{\"name\":\"demo\"}\n"
        );
    }

    #[test]
    fn test_restore_refuses_on_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        let record = store.create_full("start", None).unwrap();
        // Tamper with the stored tree.
        let stored = dir
            .path()
            .join(".teamflow")
            .join("backups")
            .join(&record.id)
            .join("files")
            .join(".env");
        std::fs::write(&stored, "tampered").unwrap();

        assert!(matches!(store.verify(&record.id), Err(BackupError::ChecksumMismatch { .. })));
        assert!(store.restore(&record.id, None).is_err());
    }

    #[test]
    fn test_retention_drops_tail() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = BackupStore::new(dir.path(), dir.path().join(".teamflow").join("backups"), 3);

        let first = store.create_full("start", None).unwrap();
        for _ in 0..3 {
            store.create_full("start", None).unwrap();
        }

        let records = store.records().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.id != first.id));
        assert!(!dir
            .path()
            .join(".teamflow")
            .join("backups")
            .join(&first.id)
            .exists());
    }

    #[test]
    fn test_orphaned_incremental_degrades_on_verify() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        // Retention of 1: the incremental's base is dropped immediately.
        let store = BackupStore::new(dir.path(), dir.path().join(".teamflow").join("backups"), 1);

        store.create_full("start", None).unwrap();
        let inc = store.create_incremental("start", None).unwrap();
        assert_eq!(inc.kind, BackupKind::Incremental);

        store.verify(&inc.id).unwrap();
        let records = store.records().unwrap();
        assert_eq!(records[0].kind, BackupKind::Full);
        assert!(records[0].based_on_id.is_none());
    }

    #[test]
    fn test_latest_for_operation() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let store = store_in(dir.path());

        store.create_full("start", None).unwrap();
        let finish = store.create_full("finish", None).unwrap();
        assert_eq!(
            store.latest_for_operation("finish").unwrap().unwrap().id,
            finish.id
        );
        assert!(store.latest_for_operation("team").unwrap().is_none());
    }
}
