use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::inputs;
use crate::cli::{SendArgs, SendTextArgs};
use crate::tgup_core::cancel::CancelToken;
use crate::tgup_core::discovery::{Discovery, DiscoveryConfig, PatternFilter};
use crate::tgup_core::dispatcher::{Dispatcher, DispatcherConfig};
use crate::tgup_core::domain::{QueueMeta, QueueParams, SendKind};
use crate::tgup_core::image_prep::{ImageLimits, PassthroughPreparer};
use crate::tgup_core::job_log::JobLog;
use crate::tgup_core::pause::PauseGate;
use crate::tgup_core::remote::RemoteClient;
use crate::tgup_core::settings::load_credentials;
use crate::tgup_core::supervisor;
use crate::tgup_core::telegram::{ChatTarget, MAX_MEDIA_GROUP_SIZE, RetryPolicy, TelegramClient};

pub fn run_send_text(args: &SendTextArgs) -> Result<()> {
    let credentials = load_credentials(&args.target.credentials)?;
    let client = TelegramClient::new(
        credentials.api_urls,
        credentials.tokens,
        ChatTarget {
            chat: args.target.chat.clone(),
            thread: args.target.thread,
        },
        RetryPolicy::default(),
        CancelToken::new(),
    )?;
    client.send_text(&args.text)
}

/// Shared runner for the one-shot sending verbs: collect the inputs into a
/// (possibly persistent) queue, then drain it to completion. Per-item
/// failures are reported but never fail the process.
pub fn run_send(args: &SendArgs, kinds: &[SendKind], command: &str) -> Result<()> {
    let credentials = load_credentials(&args.target.credentials)?;
    let cancel = CancelToken::new();
    let pause_gate = Arc::new(PauseGate::new());
    supervisor::install_signal_handlers(cancel.clone(), pause_gate.clone())?;

    let archive_passwords = collect_archive_passwords(args)?;
    let job_log = Arc::new(open_job_log(args, kinds, command)?);

    let filter = PatternFilter::new(&args.include, &args.exclude)?;
    for path in &args.files {
        inputs::enqueue_explicit_file(&job_log, path, kinds);
    }
    if !args.dirs.is_empty() {
        let mut discovery = Discovery::new(
            DiscoveryConfig {
                roots: args.dirs.clone(),
                recursive: args.recursive,
                scan_interval: Duration::from_secs(1),
                // One-shot inputs are assumed complete; no settle window.
                settle: Duration::ZERO,
                kinds: kinds.to_vec(),
                scan_archives: false,
                include: args.include.clone(),
                exclude: args.exclude.clone(),
            },
            job_log.clone(),
            pause_gate.clone(),
            cancel.clone(),
        )?;
        discovery.scan_once();
    }
    for path in &args.archives {
        inputs::enqueue_archive_entries(&job_log, path, kinds, &filter);
    }

    let client: Arc<dyn RemoteClient> = Arc::new(TelegramClient::new(
        credentials.api_urls,
        credentials.tokens,
        ChatTarget {
            chat: args.target.chat.clone(),
            thread: args.target.thread,
        },
        RetryPolicy::default(),
        cancel.clone(),
    )?);

    let mut dispatcher = Dispatcher::new(
        DispatcherConfig {
            send_interval: Duration::from_secs(1),
            batch_delay: Duration::from_secs(args.batch_delay),
            group_size: args.group_size.clamp(1, MAX_MEDIA_GROUP_SIZE),
            retry_limit: args.queue_retries,
            pause_every: 0,
            pause_duration: Duration::ZERO,
            image_limits: ImageLimits {
                max_dimension: args.max_dimension,
                max_bytes: args.max_bytes,
                png_start_level: args.png_start_level,
            },
            archive_passwords,
        },
        job_log.clone(),
        client,
        Arc::new(PassthroughPreparer),
        pause_gate,
        cancel,
    );
    dispatcher.register_progress_listener(super::console_progress_listener());
    dispatcher.run_until_drained();

    let stats = job_log.stats();
    job_log.close();
    println!(
        "{command}: {} sent, {} failed, {} still pending",
        stats.sent,
        stats.failed,
        stats.queued + stats.sending
    );
    Ok(())
}

fn open_job_log(args: &SendArgs, kinds: &[SendKind], command: &str) -> Result<JobLog> {
    let Some(queue_path) = &args.queue_file else {
        return Ok(JobLog::in_memory());
    };
    let mut roots: Vec<String> = args
        .files
        .iter()
        .chain(&args.dirs)
        .chain(&args.archives)
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    roots.sort();
    let params = QueueParams {
        command: command.to_string(),
        chat: args.target.chat.clone(),
        thread: args.target.thread,
        roots,
        recursive: args.recursive,
        media: kinds.iter().map(|k| k.as_str().to_string()).collect(),
        include: args.include.clone(),
        exclude: args.exclude.clone(),
    };
    JobLog::open(queue_path, Some(QueueMeta::new(params)))
}

fn collect_archive_passwords(args: &SendArgs) -> Result<Vec<String>> {
    let mut passwords = args.archive_passwords.clone();
    if let Some(path) = &args.archive_password_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read password file {}", path.display()))?;
        passwords.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    Ok(passwords)
}
