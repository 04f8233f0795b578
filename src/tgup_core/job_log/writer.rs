use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::tgup_core::domain::Item;

/// Bounded so a stalled disk eventually blocks producers instead of
/// buffering records without limit.
const CHANNEL_CAPACITY: usize = 4096;
/// Flush early once this many records accumulate between ticks.
const FLUSH_THRESHOLD: usize = 128;
const FLUSH_TICK: Duration = Duration::from_secs(1);

pub(super) enum WriterMsg {
    Record(Box<Item>),
}

pub(super) struct WriterHandle {
    pub(super) tx: SyncSender<WriterMsg>,
    pub(super) thread: JoinHandle<()>,
}

pub(super) fn spawn_writer(file: File, path: PathBuf) -> Result<WriterHandle> {
    let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
    let thread = thread::Builder::new()
        .name("tgup-log-writer".to_string())
        .spawn(move || writer_loop(file, &path, &rx))
        .context("failed to spawn queue writer thread")?;
    Ok(WriterHandle { tx, thread })
}

/// Collect records and append them as JSON lines. Flushes on the one-second
/// tick, when the batch grows past the threshold, and on shutdown. Write
/// errors are logged and the loop keeps accepting records; a record lost to
/// a failed append is recovered by the next update of the same item.
fn writer_loop(file: File, path: &Path, rx: &Receiver<WriterMsg>) {
    let mut out = BufWriter::new(file);
    let mut batch: Vec<Box<Item>> = Vec::new();
    let mut next_flush = Instant::now() + FLUSH_TICK;

    loop {
        let timeout = next_flush.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(WriterMsg::Record(item)) => {
                batch.push(item);
                // A steady stream of records keeps recv_timeout returning
                // Ok, so the tick is checked here as well.
                if batch.len() >= FLUSH_THRESHOLD || Instant::now() >= next_flush {
                    flush_batch(&mut out, path, &mut batch);
                    next_flush = Instant::now() + FLUSH_TICK;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                flush_batch(&mut out, path, &mut batch);
                next_flush = Instant::now() + FLUSH_TICK;
            }
            Err(RecvTimeoutError::Disconnected) => {
                flush_batch(&mut out, path, &mut batch);
                return;
            }
        }
    }
}

fn flush_batch(out: &mut BufWriter<File>, path: &Path, batch: &mut Vec<Box<Item>>) {
    if batch.is_empty() {
        return;
    }
    for item in batch.drain(..) {
        match serde_json::to_string(&*item) {
            Ok(line) => {
                if let Err(err) = writeln!(out, "{line}") {
                    eprintln!(
                        "failed to append item {} to {}: {err:#}",
                        item.id,
                        path.display()
                    );
                }
            }
            Err(err) => {
                eprintln!("failed to encode item {} for {}: {err}", item.id, path.display());
            }
        }
    }
    if let Err(err) = out.flush() {
        eprintln!("failed to flush queue file {}: {err:#}", path.display());
    }
}
