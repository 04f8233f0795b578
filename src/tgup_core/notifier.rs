use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancelToken;
use super::domain::QueueStats;
use super::job_log::JobLog;
use super::remote::RemoteClient;

/// Optional fourth task: posts a periodic queue summary to the chat while
/// watch mode runs. An interval of zero disables it.
pub struct Notifier {
    interval: Duration,
    job_log: Arc<JobLog>,
    client: Arc<dyn RemoteClient>,
    cancel: CancelToken,
}

impl Notifier {
    pub fn new(
        interval: Duration,
        job_log: Arc<JobLog>,
        client: Arc<dyn RemoteClient>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            interval,
            job_log,
            client,
            cancel,
        }
    }

    pub fn run(self) {
        if self.interval.is_zero() {
            return;
        }
        loop {
            if !self.cancel.sleep_for(self.interval) {
                return;
            }
            let text = format_summary(&self.job_log.stats());
            if let Err(err) = self.client.send_text(&text) {
                eprintln!("status notification failed: {err:#}");
            }
        }
    }
}

fn format_summary(stats: &QueueStats) -> String {
    format!(
        "tgup status: {} sent, {} failed, {} queued, {} in flight",
        stats.sent, stats.failed, stats.queued, stats.sending
    )
}
