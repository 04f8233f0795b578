use std::fs;
use std::path::Path;

use crate::tgup_core::archive;
use crate::tgup_core::discovery::{PatternFilter, mtime_nanos};
use crate::tgup_core::domain::{ItemDraft, SendKind};
use crate::tgup_core::job_log::JobLog;
use crate::tgup_core::media_kinds;

/// Enqueue one explicitly named file. Unsupported or disabled kinds are
/// skipped with a warning; only I/O on the path itself is an error worth
/// surfacing, and even that just skips the file.
pub(crate) fn enqueue_explicit_file(job_log: &JobLog, path: &Path, kinds: &[SendKind]) {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            eprintln!("skipping {}: not a regular file", path.display());
            return;
        }
        Err(err) => {
            eprintln!("skipping {}: {err}", path.display());
            return;
        }
    };
    let Some(kind) = media_kinds::classify_path(path) else {
        eprintln!("skipping {}: unsupported extension", path.display());
        return;
    };
    if !kinds.contains(&kind) {
        eprintln!(
            "skipping {}: {} files are not part of this command",
            path.display(),
            kind.as_str()
        );
        return;
    }

    let draft = ItemDraft::plain_file(path, metadata.len(), mtime_nanos(&metadata), kind);
    report_enqueue(job_log, draft);
}

/// Expand one explicitly named archive: every entry matching the kind set
/// and the include/exclude globs becomes an item.
pub(crate) fn enqueue_archive_entries(
    job_log: &JobLog,
    path: &Path,
    kinds: &[SendKind],
    filter: &PatternFilter,
) {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            eprintln!("skipping archive {}: {err}", path.display());
            return;
        }
    };
    let entries = match archive::list_entries(path) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("skipping unreadable archive {}: {err:#}", path.display());
            return;
        }
    };

    let container_size = metadata.len();
    let container_mtime = mtime_nanos(&metadata);
    for entry in entries {
        let Some(kind) = media_kinds::classify_entry_name(&entry.name) else {
            continue;
        };
        if !kinds.contains(&kind) || !filter.matches(&entry.name) {
            continue;
        }
        let draft = ItemDraft::archive_entry(
            path,
            &entry.name,
            entry.size,
            entry.crc32,
            kind,
            container_size,
            Some(container_mtime),
        );
        report_enqueue(job_log, draft);
    }
}

fn report_enqueue(job_log: &JobLog, draft: ItemDraft) {
    let name = draft.source_path.clone();
    match job_log.enqueue(draft) {
        Ok(true) => {}
        Ok(false) => crate::debug_eprintln!("already queued: {name}"),
        Err(err) => eprintln!("failed to enqueue {name}: {err}"),
    }
}
