//! Thin command layer over `tgup_core`: one-shot sends and the watch daemon.
pub(crate) mod inputs;
pub mod send;
pub mod watch;

use std::sync::Arc;

use crate::tgup_core::dispatcher::{ProgressEvent, ProgressListener, ProgressStatus};

/// Console reporter for batch progress, shared by every sending verb.
pub(crate) fn console_progress_listener() -> ProgressListener {
    Arc::new(|event: &ProgressEvent| {
        if event.status != ProgressStatus::Sending {
            return;
        }
        let Some(name) = event.current_file.as_deref() else {
            return;
        };
        eprintln!(
            "[{}/{}] {name} (eta {:.0}s)",
            event.completed,
            event.total,
            event.eta_ms as f64 / 1000.0
        );
    })
}
