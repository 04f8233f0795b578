use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const QUEUE_META_TYPE: &str = "queue_meta";
pub const QUEUE_META_VERSION: u32 = 1;

/// Where the bytes of an artifact live: a plain filesystem file or one entry
/// inside a zip archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Archive,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Archive => "archive",
        }
    }
}

/// Which remote call delivers an artifact. Images are the only kind that is
/// grouped into multi-file batches on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SendKind {
    Image,
    Video,
    Audio,
    Document,
}

impl SendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SendKind::Image => "image",
            SendKind::Video => "video",
            SendKind::Audio => "audio",
            SendKind::Document => "document",
        }
    }

    pub const ALL: [SendKind; 4] = [
        SendKind::Image,
        SendKind::Video,
        SendKind::Audio,
        SendKind::Document,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl ItemStatus {
    /// Items in these states are eligible for (re-)dispatch.
    pub fn is_pending(self) -> bool {
        matches!(self, ItemStatus::Queued | ItemStatus::Failed)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue file was created with different parameters (meta mismatch)")]
    MetaMismatch,
    #[error("unknown item id {0}")]
    UnknownItem(u64),
    #[error("invalid status transition for item {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: u64,
        from: ItemStatus,
        to: ItemStatus,
    },
    #[error("job log is closed")]
    LogClosed,
    #[error("item fingerprint must not be empty")]
    EmptyFingerprint,
}

/// One logical artifact to deliver. Records are append-only on disk; replay
/// keeps the latest record per `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: u64,
    pub source_kind: SourceKind,
    pub source_path: String,
    /// Entry name inside the archive; present iff `source_kind` is `archive`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_path: Option<String>,
    /// Byte length of the logical content (entry size for archive entries).
    pub size: u64,
    /// Modification timestamp in nanoseconds since the epoch, for plain files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_nanos: Option<i64>,
    /// CRC-32 of the archive entry, for archive entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc: Option<u32>,
    pub send_kind: SendKind,
    pub fingerprint: String,
    pub source_fingerprint: String,
    pub status: ItemStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(with = "rfc3339_nanos")]
    pub enqueued_at: DateTime<Utc>,
    #[serde(with = "rfc3339_nanos")]
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Short name shown in progress events: `photo.jpg` for plain files,
    /// `bundle.zip:photos/photo.jpg` for archive entries.
    pub fn display_name(&self) -> String {
        let base = Path::new(&self.source_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.clone());
        match &self.inner_path {
            Some(inner) => format!("{base}:{inner}"),
            None => base,
        }
    }
}

/// A not-yet-enqueued artifact. The JobLog assigns the id, status and
/// timestamps at enqueue time.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub source_kind: SourceKind,
    pub source_path: String,
    pub inner_path: Option<String>,
    pub size: u64,
    pub mtime_nanos: Option<i64>,
    pub crc: Option<u32>,
    pub send_kind: SendKind,
    pub fingerprint: String,
    pub source_fingerprint: String,
}

impl ItemDraft {
    pub fn plain_file(path: &Path, size: u64, mtime_nanos: i64, send_kind: SendKind) -> Self {
        let source_path = path.to_string_lossy().into_owned();
        let fingerprint = file_fingerprint(&source_path, size, mtime_nanos);
        let source_fingerprint =
            source_fingerprint(SourceKind::File, &source_path, size, Some(mtime_nanos));
        Self {
            source_kind: SourceKind::File,
            source_path,
            inner_path: None,
            size,
            mtime_nanos: Some(mtime_nanos),
            crc: None,
            send_kind,
            fingerprint,
            source_fingerprint,
        }
    }

    pub fn archive_entry(
        archive_path: &Path,
        inner_path: &str,
        entry_size: u64,
        crc: u32,
        send_kind: SendKind,
        container_size: u64,
        container_mtime_nanos: Option<i64>,
    ) -> Self {
        let source_path = archive_path.to_string_lossy().into_owned();
        let fingerprint = archive_entry_fingerprint(&source_path, entry_size, inner_path, crc);
        let source_fingerprint = source_fingerprint(
            SourceKind::Archive,
            &source_path,
            container_size,
            container_mtime_nanos,
        );
        Self {
            source_kind: SourceKind::Archive,
            source_path,
            inner_path: Some(inner_path.to_string()),
            size: entry_size,
            mtime_nanos: None,
            crc: Some(crc),
            send_kind,
            fingerprint,
            source_fingerprint,
        }
    }
}

/// Canonical per-artifact identity, stable across re-runs as long as the
/// bytes at the path did not change.
pub fn file_fingerprint(path: &str, size: u64, mtime_nanos: i64) -> String {
    format!("file|{path}|{size}|{mtime_nanos}")
}

pub fn archive_entry_fingerprint(path: &str, entry_size: u64, inner: &str, crc: u32) -> String {
    format!("archive|{path}|{entry_size}|{inner}|{crc}")
}

/// Canonical container identity: the same regardless of which entries a
/// container holds.
pub fn source_fingerprint(
    kind: SourceKind,
    path: &str,
    size: u64,
    mtime_nanos: Option<i64>,
) -> String {
    match mtime_nanos {
        Some(nanos) => format!("{}|{path}|{size}|{nanos}", kind.as_str()),
        None => format!("{}|{path}|{size}|", kind.as_str()),
    }
}

/// First record of a queue file: identifies the run configuration that
/// created the log so stale queue files are not silently reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueMeta {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub params: QueueParams,
}

impl QueueMeta {
    pub fn new(params: QueueParams) -> Self {
        Self {
            kind: QUEUE_META_TYPE.to_string(),
            version: QUEUE_META_VERSION,
            params: params.normalized(),
        }
    }

    /// Deep equality after normalization on both sides.
    pub fn matches(&self, other: &QueueMeta) -> bool {
        self.kind == other.kind
            && self.version == other.version
            && self.params.normalized() == other.params.normalized()
    }
}

/// Normalized run configuration captured inside the queue meta record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueParams {
    pub command: String,
    pub chat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<i64>,
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl QueueParams {
    /// Trim, drop empties, sort and dedup every list so `["/a ", "/b", "/a"]`
    /// compares equal to `["/a", "/b"]`.
    pub fn normalized(&self) -> QueueParams {
        QueueParams {
            command: self.command.trim().to_string(),
            chat: self.chat.trim().to_string(),
            thread: self.thread,
            roots: normalize_list(&self.roots),
            recursive: self.recursive,
            media: normalize_list(&self.media),
            include: normalize_list(&self.include),
            exclude: normalize_list(&self.exclude),
        }
    }
}

fn normalize_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Counts per status, as returned by `JobLog::stats`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: usize,
    pub sending: usize,
    pub sent: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.queued + self.sending + self.sent + self.failed
    }
}

/// Serialize timestamps as RFC-3339 with exactly nanosecond precision so
/// records written by different builds compare byte-for-byte.
pub mod rfc3339_nanos {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}
