use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::cli::WatchArgs;
use crate::tgup_core::cancel::CancelToken;
use crate::tgup_core::discovery::{Discovery, DiscoveryConfig};
use crate::tgup_core::dispatcher::{Dispatcher, DispatcherConfig};
use crate::tgup_core::domain::{QueueMeta, QueueParams};
use crate::tgup_core::image_prep::{ImageLimits, PassthroughPreparer};
use crate::tgup_core::job_log::JobLog;
use crate::tgup_core::notifier::Notifier;
use crate::tgup_core::pause::PauseGate;
use crate::tgup_core::remote::RemoteClient;
use crate::tgup_core::settings::{WatchSettings, load_credentials, read_json_file};
use crate::tgup_core::supervisor::{self, Supervisor};
use crate::tgup_core::telegram::{ChatTarget, MAX_MEDIA_GROUP_SIZE, RetryPolicy, TelegramClient};

/// Run the long-lived pipeline: discovery, dispatcher and notifier threads
/// under one supervisor, until a signal cancels the token.
pub fn run_watch(args: &WatchArgs) -> Result<()> {
    let settings: WatchSettings = read_json_file(&args.settings)
        .with_context(|| format!("failed to load settings {}", args.settings.display()))?;
    validate_settings(&settings)?;
    let credentials = load_credentials(&args.credentials)?;

    let cancel = CancelToken::new();
    let pause_gate = Arc::new(PauseGate::new());
    supervisor::install_signal_handlers(cancel.clone(), pause_gate.clone())?;

    let queue_path = args
        .queue_file
        .clone()
        .or_else(|| settings.queue_file.as_ref().map(PathBuf::from));
    let job_log = Arc::new(match &queue_path {
        Some(path) => JobLog::open(path, Some(QueueMeta::new(watch_queue_params(&settings))))?,
        None => JobLog::in_memory(),
    });

    let client: Arc<dyn RemoteClient> = Arc::new(TelegramClient::new(
        credentials.api_urls,
        credentials.tokens,
        ChatTarget {
            chat: settings.chat.clone(),
            thread: settings.thread,
        },
        RetryPolicy::default(),
        cancel.clone(),
    )?);

    let discovery = Discovery::new(
        DiscoveryConfig {
            roots: settings.directories.iter().map(PathBuf::from).collect(),
            recursive: settings.recursive,
            scan_interval: Duration::from_secs(settings.scan_interval_secs),
            settle: Duration::from_secs(settings.settle_secs),
            kinds: settings.enabled_kinds(),
            scan_archives: settings.scan_archives,
            include: settings.include.clone(),
            exclude: settings.exclude.clone(),
        },
        job_log.clone(),
        pause_gate.clone(),
        cancel.clone(),
    )?;

    let mut dispatcher = Dispatcher::new(
        DispatcherConfig {
            send_interval: Duration::from_secs(settings.send_interval_secs),
            batch_delay: Duration::from_secs(settings.batch_delay_secs),
            group_size: settings.group_size.clamp(1, MAX_MEDIA_GROUP_SIZE),
            retry_limit: settings.retry_limit,
            pause_every: settings.pause_every,
            pause_duration: Duration::from_secs(settings.pause_seconds),
            image_limits: ImageLimits {
                max_dimension: settings.max_dimension,
                max_bytes: settings.max_bytes,
                png_start_level: settings.png_start_level,
            },
            archive_passwords: settings.archive_passwords.clone(),
        },
        job_log.clone(),
        client.clone(),
        Arc::new(PassthroughPreparer),
        pause_gate.clone(),
        cancel.clone(),
    );
    dispatcher.register_progress_listener(super::console_progress_listener());

    let mut supervisor = Supervisor::new(cancel.clone(), pause_gate);
    supervisor.spawn_discovery(discovery)?;
    supervisor.spawn_dispatcher(dispatcher)?;
    if settings.notify_interval_secs > 0 {
        supervisor.spawn_notifier(Notifier::new(
            Duration::from_secs(settings.notify_interval_secs),
            job_log.clone(),
            client,
            cancel.clone(),
        ))?;
    }

    eprintln!(
        "watching {} directories, queue {}",
        settings.directories.len(),
        queue_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in memory".to_string())
    );
    supervisor.join();
    job_log.close();
    Ok(())
}

fn validate_settings(settings: &WatchSettings) -> Result<()> {
    if settings.chat.trim().is_empty() {
        bail!("settings must name a chat target");
    }
    if settings.directories.is_empty() {
        bail!("settings must name at least one directory to watch");
    }
    if settings.enabled_kinds().is_empty() {
        bail!("settings disable every media kind; nothing would ever be sent");
    }
    Ok(())
}

fn watch_queue_params(settings: &WatchSettings) -> QueueParams {
    QueueParams {
        command: "watch".to_string(),
        chat: settings.chat.clone(),
        thread: settings.thread,
        roots: settings.directories.clone(),
        recursive: settings.recursive,
        media: settings
            .enabled_kinds()
            .iter()
            .map(|k| k.as_str().to_string())
            .collect(),
        include: settings.include.clone(),
        exclude: settings.exclude.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_settings() -> WatchSettings {
        serde_json::from_value(json!({
            "chat": "@target",
            "directories": ["/watch"],
        }))
        .expect("minimal settings")
    }

    #[test]
    fn validation_rejects_empty_targets_and_roots() {
        assert!(validate_settings(&minimal_settings()).is_ok());

        let mut no_chat = minimal_settings();
        no_chat.chat = "  ".to_string();
        assert!(validate_settings(&no_chat).is_err());

        let mut no_roots = minimal_settings();
        no_roots.directories.clear();
        assert!(validate_settings(&no_roots).is_err());

        let mut no_kinds = minimal_settings();
        no_kinds.send_images = false;
        no_kinds.send_videos = false;
        no_kinds.send_audio = false;
        no_kinds.send_documents = false;
        assert!(validate_settings(&no_kinds).is_err());
    }

    #[test]
    fn queue_params_normalize_to_the_same_meta_across_runs() {
        let mut a = minimal_settings();
        a.directories = vec!["/watch ".to_string(), "/watch".to_string(), "/b".to_string()];
        let mut b = minimal_settings();
        b.directories = vec!["/b".to_string(), "/watch".to_string()];

        let meta_a = QueueMeta::new(watch_queue_params(&a));
        let meta_b = QueueMeta::new(watch_queue_params(&b));
        assert!(meta_a.matches(&meta_b));
    }
}
