#[macro_export]
macro_rules! debug_eprintln {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        {
            eprintln!($($arg)*);
        }
        // In release builds we still want the arguments to be "used" so we
        // don't get unused variable/import warnings, but we do not want to
        // evaluate potentially expensive formatting expressions.
        #[cfg(not(debug_assertions))]
        {
            let _ = || {
                let _ = format_args!($($arg)*);
            };
        }
    }};
}

pub mod cli;
pub mod commands;
pub(crate) mod sync_ext;
pub mod tgup_core;

// Expose the pieces the binary and integration-style callers need without
// making every engine internal part of the public API surface.
pub use crate::tgup_core::dispatcher::{ProgressEvent, ProgressStatus};
pub use crate::tgup_core::domain::{Item, ItemStatus, SendKind, SourceKind};
pub use crate::tgup_core::job_log::JobLog;
