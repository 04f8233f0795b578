use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use super::archive;
use super::cancel::CancelToken;
use super::domain::{Item, ItemStatus, SendKind, SourceKind};
use super::image_prep::{ImageLimits, ImagePreparer};
use super::job_log::JobLog;
use super::pause::{GateWait, PauseGate};
use super::remote::{OutboundFile, RemoteClient};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep between drains of the pending snapshot.
    pub send_interval: Duration,
    /// Sleep between batches within one drain.
    pub batch_delay: Duration,
    /// Upper bound on consecutive images sent as one wire call.
    pub group_size: usize,
    /// Items whose attempts exceed this stop appearing in snapshots.
    pub retry_limit: u32,
    /// After this many successful sends, take the pacing pause. Zero
    /// disables pacing.
    pub pause_every: u32,
    pub pause_duration: Duration,
    pub image_limits: ImageLimits,
    pub archive_passwords: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(30),
            batch_delay: Duration::from_secs(3),
            group_size: 4,
            retry_limit: 3,
            pause_every: 0,
            pause_duration: Duration::ZERO,
            image_limits: ImageLimits::default(),
            archive_passwords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    pub remaining: usize,
    pub total: usize,
    pub completed: usize,
    /// Smoothed per-file cost in milliseconds (exponential moving average).
    pub per_file_ms: f64,
    pub eta_ms: u64,
}

pub type ProgressListener = Arc<dyn Fn(&ProgressEvent) + Send + Sync + 'static>;

/// Consumer half of the pipeline: drains the JobLog oldest-first, groups
/// consecutive images into one wire call, paces itself between batches, and
/// is the only writer of item status after enqueue.
pub struct Dispatcher {
    config: DispatcherConfig,
    job_log: Arc<JobLog>,
    client: Arc<dyn RemoteClient>,
    preparer: Arc<dyn ImagePreparer>,
    pause_gate: Arc<PauseGate>,
    cancel: CancelToken,
    listeners: Vec<ProgressListener>,
    avg_per_file_ms: Option<f64>,
    sent_since_pause: u32,
}

impl Dispatcher {
    pub fn new(
        mut config: DispatcherConfig,
        job_log: Arc<JobLog>,
        client: Arc<dyn RemoteClient>,
        preparer: Arc<dyn ImagePreparer>,
        pause_gate: Arc<PauseGate>,
        cancel: CancelToken,
    ) -> Self {
        config.group_size = config.group_size.max(1);
        Self {
            config,
            job_log,
            client,
            preparer,
            pause_gate,
            cancel,
            listeners: Vec::new(),
            avg_per_file_ms: None,
            sent_since_pause: 0,
        }
    }

    pub fn register_progress_listener(&mut self, listener: ProgressListener) {
        self.listeners.push(listener);
    }

    pub fn run(mut self) {
        loop {
            if self.pause_gate.wait(&self.cancel) == GateWait::Cancelled {
                return;
            }
            self.drain_once();
            if !self.cancel.sleep_for(self.config.send_interval) {
                return;
            }
        }
    }

    /// Drain one-shot queues to completion: every item ends `sent` or runs
    /// out of retry budget.
    pub fn run_until_drained(&mut self) {
        while !self.cancel.is_cancelled() {
            if self.drain_once() == 0 {
                return;
            }
        }
    }

    /// Process one pending snapshot. Returns the number of items handled
    /// (sent or failed); zero means the queue was idle.
    pub fn drain_once(&mut self) -> usize {
        let pending = self.job_log.pending(None, self.config.retry_limit);
        if pending.is_empty() {
            self.emit(ProgressEvent {
                status: ProgressStatus::Idle,
                current_file: None,
                remaining: 0,
                total: 0,
                completed: 0,
                per_file_ms: self.avg_per_file_ms.unwrap_or(0.0),
                eta_ms: 0,
            });
            return 0;
        }

        let total = pending.len();
        let mut completed = 0usize;
        let mut index = 0usize;

        while index < pending.len() {
            // A gate closed mid-traversal parks us here; the in-flight batch
            // always completes first.
            if self.pause_gate.wait(&self.cancel) == GateWait::Cancelled {
                return completed;
            }

            let started = Instant::now();
            let item = &pending[index];
            let (processed, successes, current_file) = if item.send_kind == SendKind::Image {
                let mut end = index + 1;
                while end < pending.len()
                    && pending[end].send_kind == SendKind::Image
                    && end - index < self.config.group_size
                {
                    end += 1;
                }
                let batch = &pending[index..end];
                let successes = self.send_image_batch(batch);
                (batch.len(), successes, batch[batch.len() - 1].display_name())
            } else {
                let success = self.send_single(item);
                (1, u32::from(success), item.display_name())
            };

            index += processed;
            completed += processed;
            self.sent_since_pause += successes;
            self.record_progress(started.elapsed(), processed, total, completed, current_file);

            if self.config.pause_every > 0
                && self.sent_since_pause >= self.config.pause_every
                && !self.config.pause_duration.is_zero()
            {
                if !self.cancel.sleep_for(self.config.pause_duration) {
                    return completed;
                }
                self.sent_since_pause = 0;
            }

            if index < pending.len() && !self.cancel.sleep_for(self.config.batch_delay) {
                return completed;
            }
        }

        completed
    }

    /// Returns how many batch members were sent successfully.
    fn send_image_batch(&self, batch: &[Item]) -> u32 {
        let mut ids: Vec<u64> = Vec::with_capacity(batch.len());
        let mut files: Vec<OutboundFile> = Vec::with_capacity(batch.len());

        for item in batch {
            if let Err(err) = self
                .job_log
                .update_status(item.id, ItemStatus::Sending, None, 0)
            {
                eprintln!("failed to mark item {} as sending: {err}", item.id);
                continue;
            }
            let bytes = match self.load_bytes(item) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.mark_failed(item.id, &err);
                    continue;
                }
            };
            match self
                .preparer
                .prepare(&item.display_name(), bytes, &self.config.image_limits)
            {
                Ok(prepared) => {
                    ids.push(item.id);
                    files.push(OutboundFile::new(prepared.filename, prepared.bytes));
                }
                Err(err) => self.mark_failed(item.id, &err),
            }
        }

        if files.is_empty() {
            return 0;
        }

        match self.client.send_media_batch(&files) {
            Ok(()) => {
                for id in &ids {
                    if let Err(err) = self.job_log.update_status(*id, ItemStatus::Sent, None, 0) {
                        eprintln!("failed to mark item {id} as sent: {err}");
                    }
                }
                ids.len() as u32
            }
            Err(err) => {
                let message = format!("{err:#}");
                for id in &ids {
                    if let Err(err) = self.job_log.update_status(
                        *id,
                        ItemStatus::Failed,
                        Some(message.clone()),
                        1,
                    ) {
                        eprintln!("failed to mark item {id} as failed: {err}");
                    }
                }
                0
            }
        }
    }

    fn send_single(&self, item: &Item) -> bool {
        if let Err(err) = self
            .job_log
            .update_status(item.id, ItemStatus::Sending, None, 0)
        {
            eprintln!("failed to mark item {} as sending: {err}", item.id);
            return false;
        }
        let bytes = match self.load_bytes(item) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.mark_failed(item.id, &err);
                return false;
            }
        };
        let file = OutboundFile::new(item.display_name(), bytes);
        let result = match item.send_kind {
            SendKind::Video => self.client.send_video(&file),
            SendKind::Audio => self.client.send_audio(&file),
            SendKind::Document => self.client.send_document(&file),
            // Stray single images still use the batch call, as a singleton.
            SendKind::Image => self.client.send_media_batch(std::slice::from_ref(&file)),
        };
        match result {
            Ok(()) => {
                if let Err(err) = self
                    .job_log
                    .update_status(item.id, ItemStatus::Sent, None, 0)
                {
                    eprintln!("failed to mark item {} as sent: {err}", item.id);
                }
                true
            }
            Err(err) => {
                self.mark_failed(item.id, &err);
                false
            }
        }
    }

    fn load_bytes(&self, item: &Item) -> Result<Vec<u8>> {
        match item.source_kind {
            SourceKind::File => fs::read(&item.source_path)
                .with_context(|| format!("failed to read {}", item.source_path)),
            SourceKind::Archive => {
                let inner = item
                    .inner_path
                    .as_deref()
                    .ok_or_else(|| anyhow!("archive item {} has no entry name", item.id))?;
                archive::read_entry(
                    Path::new(&item.source_path),
                    inner,
                    &self.config.archive_passwords,
                )
            }
        }
    }

    fn mark_failed(&self, id: u64, error: &anyhow::Error) {
        if let Err(err) =
            self.job_log
                .update_status(id, ItemStatus::Failed, Some(format!("{error:#}")), 1)
        {
            eprintln!("failed to mark item {id} as failed: {err}");
        }
    }

    fn record_progress(
        &mut self,
        elapsed: Duration,
        batch_size: usize,
        total: usize,
        completed: usize,
        current_file: String,
    ) {
        let per_file = elapsed.as_millis() as f64 / batch_size.max(1) as f64;
        let avg = match self.avg_per_file_ms {
            Some(avg) => (avg * 7.0 + per_file) / 8.0,
            None => per_file,
        };
        self.avg_per_file_ms = Some(avg);

        let remaining = total.saturating_sub(completed);
        self.emit(ProgressEvent {
            status: ProgressStatus::Sending,
            current_file: Some(current_file),
            remaining,
            total,
            completed,
            per_file_ms: avg,
            eta_ms: (remaining as f64 * avg) as u64,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }
}
