use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::sync_ext::MutexExt;
use crate::tgup_core::remote::{OutboundFile, RemoteClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RecordedCall {
    Text(String),
    Batch(Vec<String>),
    Document(String),
    Video(String),
    Audio(String),
}

/// Remote fake for pipeline tests: records every call and optionally
/// sleeps per call to simulate a slow wire.
pub(super) struct RecordingClient {
    calls: Mutex<Vec<RecordedCall>>,
    per_call_delay: Duration,
}

impl RecordingClient {
    pub(super) fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub(super) fn with_delay(per_call_delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            per_call_delay,
        }
    }

    pub(super) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock_unpoisoned().clone()
    }

    fn record(&self, call: RecordedCall) -> Result<()> {
        if !self.per_call_delay.is_zero() {
            std::thread::sleep(self.per_call_delay);
        }
        self.calls.lock_unpoisoned().push(call);
        Ok(())
    }
}

impl RemoteClient for RecordingClient {
    fn send_text(&self, text: &str) -> Result<()> {
        self.record(RecordedCall::Text(text.to_string()))
    }

    fn send_media_batch(&self, files: &[OutboundFile]) -> Result<()> {
        self.record(RecordedCall::Batch(
            files.iter().map(|f| f.filename.clone()).collect(),
        ))
    }

    fn send_document(&self, file: &OutboundFile) -> Result<()> {
        self.record(RecordedCall::Document(file.filename.clone()))
    }

    fn send_video(&self, file: &OutboundFile) -> Result<()> {
        self.record(RecordedCall::Video(file.filename.clone()))
    }

    fn send_audio(&self, file: &OutboundFile) -> Result<()> {
        self.record(RecordedCall::Audio(file.filename.clone()))
    }
}

/// Poll `predicate` until it holds or the deadline passes.
pub(super) fn wait_until(deadline: Duration, message: &str, predicate: impl Fn() -> bool) {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if predicate() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(predicate(), "{message}");
}
