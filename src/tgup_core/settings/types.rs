use serde::{Deserialize, Serialize};

use crate::tgup_core::domain::SendKind;

/// Watch-mode settings file (JSON). Numeric knobs fall back to the
/// documented defaults when absent so hand-written files can stay small.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchSettings {
    /// Chat id or @channelname to deliver to.
    pub chat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<i64>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_true")]
    pub send_images: bool,
    #[serde(default = "default_true")]
    pub send_videos: bool,
    #[serde(default = "default_true")]
    pub send_audio: bool,
    #[serde(default = "default_true")]
    pub send_documents: bool,
    #[serde(default)]
    pub scan_archives: bool,
    #[serde(default)]
    pub archive_passwords: Vec<String>,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_send_interval_secs")]
    pub send_interval_secs: u64,
    /// Seconds a file's `(size, mtime)` must hold still before enqueue.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_png_start_level")]
    pub png_start_level: u8,
    /// Status summary cadence; zero disables the notifier.
    #[serde(default = "default_notify_interval_secs")]
    pub notify_interval_secs: u64,
    /// Pacing: pause after this many successful sends (zero disables).
    #[serde(default)]
    pub pause_every: u32,
    #[serde(default)]
    pub pause_seconds: u64,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_file: Option<String>,
}

impl WatchSettings {
    pub fn enabled_kinds(&self) -> Vec<SendKind> {
        let mut kinds = Vec::new();
        if self.send_images {
            kinds.push(SendKind::Image);
        }
        if self.send_videos {
            kinds.push(SendKind::Video);
        }
        if self.send_audio {
            kinds.push(SendKind::Audio);
        }
        if self.send_documents {
            kinds.push(SendKind::Document);
        }
        kinds
    }
}

fn default_true() -> bool {
    true
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_send_interval_secs() -> u64 {
    30
}

fn default_settle_secs() -> u64 {
    5
}

fn default_group_size() -> usize {
    4
}

fn default_batch_delay_secs() -> u64 {
    3
}

fn default_max_dimension() -> u32 {
    2000
}

fn default_max_bytes() -> u64 {
    5_242_880
}

fn default_png_start_level() -> u8 {
    8
}

fn default_notify_interval_secs() -> u64 {
    300
}

fn default_retry_limit() -> u32 {
    3
}
