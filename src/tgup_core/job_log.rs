use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use fs2::FileExt;

use super::domain::{Item, ItemDraft, ItemStatus, QueueError, QueueMeta, QueueStats};
use crate::sync_ext::MutexExt;

mod writer;

use writer::{WriterHandle, WriterMsg, spawn_writer};

/// Durable append-only store of work items with in-memory indices.
///
/// The file format is one JSON object per line: a `queue_meta` record first,
/// then item records. Updates append a fresh record for the same id; replay
/// keeps the latest occurrence. A background writer batches appends so
/// enqueue/update never block on disk unless its channel backs up (that
/// blocking is the pipeline's backpressure lever).
pub struct JobLog {
    indexes: Mutex<Indexes>,
    next_id: AtomicU64,
    writer: Mutex<Option<WriterHandle>>,
    closed: AtomicBool,
    meta: Option<QueueMeta>,
    path: Option<PathBuf>,
    // Exclusive advisory lock held for the lifetime of the log so two
    // processes never interleave appends into one queue file.
    _lock_file: Option<std::fs::File>,
}

impl std::fmt::Debug for JobLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLog")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("meta", &self.meta)
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Default)]
struct Indexes {
    by_id: HashMap<u64, Item>,
    by_fingerprint: HashMap<String, u64>,
    by_source_fingerprint: HashMap<String, usize>,
}

impl Indexes {
    fn insert_replayed(&mut self, item: Item) {
        self.by_id.insert(item.id, item);
    }

    fn rebuild_fingerprints(&mut self) {
        self.by_fingerprint.clear();
        self.by_source_fingerprint.clear();
        for item in self.by_id.values() {
            self.by_fingerprint.insert(item.fingerprint.clone(), item.id);
            *self
                .by_source_fingerprint
                .entry(item.source_fingerprint.clone())
                .or_insert(0) += 1;
        }
    }
}

impl JobLog {
    /// Open (or create) a queue file.
    ///
    /// With a declared meta: an empty file is truncated and seeded with the
    /// meta record; a non-empty file must carry a deep-equal meta or the
    /// open fails with `QueueError::MetaMismatch` and the file is untouched.
    pub fn open(path: &Path, declared_meta: Option<QueueMeta>) -> Result<JobLog> {
        let mut lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open queue file {}", path.display()))?;
        lock_file
            .try_lock_exclusive()
            .with_context(|| format!("queue file {} is locked by another process", path.display()))?;

        let (stored_meta, mut indexes) = replay_file(&mut lock_file, path)?;

        let meta = match (stored_meta, declared_meta) {
            (Some(stored), Some(declared)) => {
                if !stored.matches(&declared) {
                    return Err(QueueError::MetaMismatch.into());
                }
                Some(stored)
            }
            (Some(stored), None) => Some(stored),
            (None, Some(declared)) => {
                if !indexes.by_id.is_empty() {
                    // Item records without a leading meta cannot be matched
                    // against the declared parameters.
                    return Err(QueueError::MetaMismatch.into());
                }
                let declared = QueueMeta::new(declared.params);
                lock_file
                    .set_len(0)
                    .with_context(|| format!("failed to truncate {}", path.display()))?;
                lock_file
                    .seek(SeekFrom::Start(0))
                    .with_context(|| format!("failed to rewind {}", path.display()))?;
                let line = serde_json::to_string(&declared).context("failed to encode queue meta")?;
                writeln!(lock_file, "{line}")
                    .with_context(|| format!("failed to write meta to {}", path.display()))?;
                lock_file
                    .flush()
                    .with_context(|| format!("failed to flush {}", path.display()))?;
                Some(declared)
            }
            (None, None) => None,
        };

        indexes.rebuild_fingerprints();
        let next_id = indexes.by_id.keys().max().copied().unwrap_or(0) + 1;

        let append_file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open {} for appending", path.display()))?;
        let writer = spawn_writer(append_file, path.to_path_buf())?;

        Ok(JobLog {
            indexes: Mutex::new(indexes),
            next_id: AtomicU64::new(next_id),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            meta,
            path: Some(path.to_path_buf()),
            _lock_file: Some(lock_file),
        })
    }

    /// A log with no backing file. One-shot sends without `--queue-file`
    /// use this: same dedupe and ordering semantics, nothing persisted.
    pub fn in_memory() -> JobLog {
        JobLog {
            indexes: Mutex::new(Indexes::default()),
            next_id: AtomicU64::new(1),
            writer: Mutex::new(None),
            closed: AtomicBool::new(false),
            meta: None,
            path: None,
            _lock_file: None,
        }
    }

    pub fn meta(&self) -> Option<&QueueMeta> {
        self.meta.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert a new item unless its fingerprint is already known. Returns
    /// `Ok(false)` for duplicates without touching any state.
    pub fn enqueue(&self, draft: ItemDraft) -> Result<bool, QueueError> {
        if draft.fingerprint.is_empty() {
            return Err(QueueError::EmptyFingerprint);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::LogClosed);
        }

        let record = {
            let mut indexes = self.indexes.lock_unpoisoned();
            if indexes.by_fingerprint.contains_key(&draft.fingerprint) {
                return Ok(false);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let now = Utc::now();
            let item = Item {
                id,
                source_kind: draft.source_kind,
                source_path: draft.source_path,
                inner_path: draft.inner_path,
                size: draft.size,
                mtime_nanos: draft.mtime_nanos,
                crc: draft.crc,
                send_kind: draft.send_kind,
                fingerprint: draft.fingerprint,
                source_fingerprint: draft.source_fingerprint,
                status: ItemStatus::Queued,
                attempts: 0,
                last_error: None,
                enqueued_at: now,
                updated_at: now,
            };
            indexes.by_fingerprint.insert(item.fingerprint.clone(), id);
            *indexes
                .by_source_fingerprint
                .entry(item.source_fingerprint.clone())
                .or_insert(0) += 1;
            indexes.by_id.insert(id, item.clone());
            item
        };

        // Hand the copy to the writer outside the index lock; a full channel
        // blocks the producer here.
        self.send_record(record)?;
        Ok(true)
    }

    pub fn has_fingerprint(&self, fingerprint: &str) -> bool {
        self.indexes
            .lock_unpoisoned()
            .by_fingerprint
            .contains_key(fingerprint)
    }

    /// Source fingerprints embed the source kind prefix, so one lookup
    /// covers both plain files and archive containers.
    pub fn has_source_fingerprint(&self, source_fingerprint: &str) -> bool {
        self.indexes
            .lock_unpoisoned()
            .by_source_fingerprint
            .contains_key(source_fingerprint)
    }

    /// Update status/attempts/error for a known item and append the new
    /// record. `sent` is terminal; `queued` is enqueue-only.
    pub fn update_status(
        &self,
        id: u64,
        status: ItemStatus,
        error: Option<String>,
        attempts_delta: u32,
    ) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::LogClosed);
        }
        let record = {
            let mut indexes = self.indexes.lock_unpoisoned();
            let item = indexes
                .by_id
                .get_mut(&id)
                .ok_or(QueueError::UnknownItem(id))?;
            let from = item.status;
            let regressing_sent = from == ItemStatus::Sent && status != ItemStatus::Sent;
            let reentering_queued = status == ItemStatus::Queued && from != ItemStatus::Queued;
            if regressing_sent || reentering_queued {
                return Err(QueueError::InvalidTransition {
                    id,
                    from,
                    to: status,
                });
            }
            item.status = status;
            item.attempts = item.attempts.saturating_add(attempts_delta);
            item.last_error = error;
            item.updated_at = Utc::now();
            item.clone()
        };
        self.send_record(record)
    }

    /// Snapshot of dispatch-eligible items (`queued`/`failed`, attempts
    /// within budget), oldest first.
    pub fn pending(&self, limit: Option<usize>, max_attempts: u32) -> Vec<Item> {
        let indexes = self.indexes.lock_unpoisoned();
        let mut items: Vec<Item> = indexes
            .by_id
            .values()
            .filter(|item| item.status.is_pending() && item.attempts <= max_attempts)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        items
    }

    pub fn stats(&self) -> QueueStats {
        let indexes = self.indexes.lock_unpoisoned();
        let mut stats = QueueStats::default();
        for item in indexes.by_id.values() {
            match item.status {
                ItemStatus::Queued => stats.queued += 1,
                ItemStatus::Sending => stats.sending += 1,
                ItemStatus::Sent => stats.sent += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Every item, ordered by id. Used by tests and end-of-run summaries.
    pub fn snapshot_items(&self) -> Vec<Item> {
        let indexes = self.indexes.lock_unpoisoned();
        let mut items: Vec<Item> = indexes.by_id.values().cloned().collect();
        items.sort_by_key(|item| item.id);
        items
    }

    /// Flush pending writes and stop the writer. Further mutations fail
    /// with `LogClosed`; lookups keep working.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let handle = self.writer.lock_unpoisoned().take();
        if let Some(handle) = handle {
            drop(handle.tx);
            if handle.thread.join().is_err() {
                eprintln!("queue writer thread panicked during shutdown");
            }
        }
    }

    fn send_record(&self, item: Item) -> Result<(), QueueError> {
        let writer = self.writer.lock_unpoisoned();
        if let Some(handle) = writer.as_ref() {
            handle
                .tx
                .send(WriterMsg::Record(Box::new(item)))
                .map_err(|_| QueueError::LogClosed)?;
        }
        Ok(())
    }
}

impl Drop for JobLog {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read every record currently in the file: the meta header (when present)
/// plus the last-writer-wins item set. Malformed lines are skipped with a
/// warning.
fn replay_file(
    file: &mut std::fs::File,
    path: &Path,
) -> Result<(Option<QueueMeta>, Indexes)> {
    file.seek(SeekFrom::Start(0))
        .with_context(|| format!("failed to rewind {}", path.display()))?;
    let reader = BufReader::new(&mut *file);

    let mut stored_meta: Option<QueueMeta> = None;
    let mut saw_first_record = false;
    let mut indexes = Indexes::default();

    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if !saw_first_record {
            saw_first_record = true;
            if looks_like_meta(trimmed) {
                match serde_json::from_str::<QueueMeta>(trimmed) {
                    Ok(meta) => {
                        stored_meta = Some(meta);
                        continue;
                    }
                    Err(err) => {
                        bail!(
                            "corrupt queue meta in {} line {}: {err}",
                            path.display(),
                            line_number + 1
                        );
                    }
                }
            }
        }

        match serde_json::from_str::<Item>(trimmed) {
            Ok(item) => indexes.insert_replayed(item),
            Err(err) => {
                eprintln!(
                    "skipping malformed record in {} line {}: {err}",
                    path.display(),
                    line_number + 1
                );
            }
        }
    }

    Ok((stored_meta, indexes))
}

fn looks_like_meta(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| {
            value
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| t == super::domain::QUEUE_META_TYPE)
        })
        .unwrap_or(false)
}
