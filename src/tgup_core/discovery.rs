use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use super::archive;
use super::cancel::CancelToken;
use super::domain::{ItemDraft, SendKind, SourceKind, source_fingerprint};
use super::job_log::JobLog;
use super::media_kinds;
use super::pause::{GateWait, PauseGate};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub roots: Vec<PathBuf>,
    pub recursive: bool,
    pub scan_interval: Duration,
    /// How long `(size, mtime)` must hold still before a file is enqueued.
    pub settle: Duration,
    /// Enabled media categories; files of other kinds are ignored.
    pub kinds: Vec<SendKind>,
    pub scan_archives: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Include/exclude glob pair. Exclude wins; an empty include set admits
/// everything.
pub struct PatternFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PatternFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_globs(include).context("invalid include pattern")?,
            exclude: compile_globs(exclude).context("invalid exclude pattern")?,
        })
    }

    pub fn matches(&self, relative: &str) -> bool {
        if self.is_excluded(relative) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(relative),
            None => true,
        }
    }

    pub fn is_excluded(&self, relative: &str) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(relative))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("bad glob {pattern:?}"))?);
    }
    Ok(Some(builder.build()?))
}

/// Tracks `(size, mtimeNanos)` per path; a file is enqueue-eligible only
/// once the tuple has held still for the settle window. Any change resets
/// the clock.
pub(crate) struct StabilityTracker {
    settle: Duration,
    entries: HashMap<PathBuf, Observation>,
}

struct Observation {
    size: u64,
    mtime_nanos: i64,
    first_observed: Instant,
}

impl StabilityTracker {
    pub(crate) fn new(settle: Duration) -> Self {
        Self {
            settle,
            entries: HashMap::new(),
        }
    }

    /// Record an observation; returns true once the tuple is settled. With
    /// a zero window the first sighting is already eligible.
    pub(crate) fn observe(&mut self, path: &Path, size: u64, mtime_nanos: i64, now: Instant) -> bool {
        let entry = self.entries.entry(path.to_path_buf()).or_insert(Observation {
            size,
            mtime_nanos,
            first_observed: now,
        });
        if entry.size != size || entry.mtime_nanos != mtime_nanos {
            entry.size = size;
            entry.mtime_nanos = mtime_nanos;
            entry.first_observed = now;
        }
        now.duration_since(entry.first_observed) >= self.settle
    }

    /// Drop state for paths not seen in the current pass.
    pub(crate) fn retain_seen(&mut self, seen: &HashSet<PathBuf>) {
        self.entries.retain(|path, _| seen.contains(path));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Producer half of the pipeline: walks the watch roots on an interval and
/// feeds stable artifacts into the JobLog. Only ever writes to the log;
/// per-file failures are logged and skipped so the loop survives anything
/// short of cancellation.
pub struct Discovery {
    config: DiscoveryConfig,
    filter: PatternFilter,
    job_log: Arc<JobLog>,
    pause_gate: Arc<PauseGate>,
    cancel: CancelToken,
    tracker: StabilityTracker,
    /// Containers already expanded during this run, so archives that
    /// produced zero items are not re-opened every pass.
    expanded_archives: HashSet<String>,
}

impl Discovery {
    pub fn new(
        config: DiscoveryConfig,
        job_log: Arc<JobLog>,
        pause_gate: Arc<PauseGate>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let filter = PatternFilter::new(&config.include, &config.exclude)?;
        let tracker = StabilityTracker::new(config.settle);
        Ok(Self {
            config,
            filter,
            job_log,
            pause_gate,
            cancel,
            tracker,
            expanded_archives: HashSet::new(),
        })
    }

    pub fn run(mut self) {
        loop {
            if self.pause_gate.wait(&self.cancel) == GateWait::Cancelled {
                return;
            }
            self.scan_once();
            if !self.cancel.sleep_for(self.config.scan_interval) {
                return;
            }
        }
    }

    /// One full pass over every root.
    pub fn scan_once(&mut self) {
        let now = Instant::now();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        let roots = self.config.roots.clone();
        for root in &roots {
            let mut files = Vec::new();
            collect_files(root, root, self.config.recursive, &self.filter, &mut files);
            for candidate in files {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.consider_file(&candidate, now, &mut seen);
            }
        }

        self.tracker.retain_seen(&seen);
    }

    fn consider_file(&mut self, candidate: &FileCandidate, now: Instant, seen: &mut HashSet<PathBuf>) {
        let path = &candidate.path;
        let is_archive = self.config.scan_archives && media_kinds::is_archive_path(path);
        let kind = media_kinds::classify_path(path);
        if !is_archive {
            let Some(kind) = kind else { return };
            if !self.kind_enabled(kind) {
                return;
            }
        }
        if !self.filter.matches(&candidate.relative) {
            return;
        }

        let size = candidate.size;
        let mtime_nanos = candidate.mtime_nanos;
        seen.insert(path.clone());
        if !self.tracker.observe(path, size, mtime_nanos, now) {
            return;
        }

        if is_archive {
            self.expand_archive(path, size, mtime_nanos);
        } else if let Some(kind) = kind {
            let draft = ItemDraft::plain_file(path, size, mtime_nanos, kind);
            self.enqueue(draft);
        }
    }

    fn expand_archive(&mut self, path: &Path, container_size: u64, container_mtime_nanos: i64) {
        let source_fp = source_fingerprint(
            SourceKind::Archive,
            &path.to_string_lossy(),
            container_size,
            Some(container_mtime_nanos),
        );
        if self.expanded_archives.contains(&source_fp)
            || self.job_log.has_source_fingerprint(&source_fp)
        {
            return;
        }

        let entries = match archive::list_entries(path) {
            Ok(entries) => entries,
            Err(err) => {
                eprintln!("skipping unreadable archive {}: {err:#}", path.display());
                return;
            }
        };

        for entry in entries {
            let Some(kind) = media_kinds::classify_entry_name(&entry.name) else {
                continue;
            };
            if !self.kind_enabled(kind) || !self.filter.matches(&entry.name) {
                continue;
            }
            let draft = ItemDraft::archive_entry(
                path,
                &entry.name,
                entry.size,
                entry.crc32,
                kind,
                container_size,
                Some(container_mtime_nanos),
            );
            self.enqueue(draft);
        }

        // Remember the container even when nothing matched, so the next
        // pass does not re-open it.
        self.expanded_archives.insert(source_fp);
    }

    fn enqueue(&self, draft: ItemDraft) {
        let name = draft.source_path.clone();
        match self.job_log.enqueue(draft) {
            Ok(true) => crate::debug_eprintln!("queued {name}"),
            Ok(false) => {}
            Err(err) => eprintln!("failed to enqueue {name}: {err}"),
        }
    }

    fn kind_enabled(&self, kind: SendKind) -> bool {
        self.config.kinds.contains(&kind)
    }
}

struct FileCandidate {
    path: PathBuf,
    relative: String,
    size: u64,
    mtime_nanos: i64,
}

fn list_dir_sorted(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    };

    // Stable order: case-insensitive lexicographic by the final path segment.
    entries.sort_by(|a, b| {
        let an = a
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        let bn = b
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        an.cmp(&bn)
    });
    entries
}

fn collect_files(
    root: &Path,
    dir: &Path,
    recursive: bool,
    filter: &PatternFilter,
    out: &mut Vec<FileCandidate>,
) {
    for path in list_dir_sorted(dir) {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        if file_type.is_dir() {
            if recursive && !filter.is_excluded(&relative) {
                collect_files(root, &path, recursive, filter, out);
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        out.push(FileCandidate {
            size: meta.len(),
            mtime_nanos: mtime_nanos(&meta),
            path,
            relative,
        });
    }
}

pub(crate) fn mtime_nanos(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn make_discovery(config: DiscoveryConfig, job_log: Arc<JobLog>) -> Discovery {
        Discovery::new(
            config,
            job_log,
            Arc::new(PauseGate::new()),
            CancelToken::new(),
        )
        .expect("build discovery")
    }

    fn config_for(root: &Path) -> DiscoveryConfig {
        DiscoveryConfig {
            roots: vec![root.to_path_buf()],
            recursive: false,
            scan_interval: Duration::from_secs(30),
            settle: Duration::ZERO,
            kinds: SendKind::ALL.to_vec(),
            scan_archives: true,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    #[test]
    fn stability_tracker_holds_files_until_the_window_elapses() {
        let mut tracker = StabilityTracker::new(Duration::from_secs(5));
        let path = Path::new("/w/a.jpg");
        let t0 = Instant::now();

        // First sight at t=1: timer starts, not yet eligible.
        assert!(!tracker.observe(path, 100, 10, t0 + Duration::from_secs(1)));
        // Growth at t=3 resets the timer.
        assert!(!tracker.observe(path, 200, 30, t0 + Duration::from_secs(3)));
        // Unchanged at t=4: only one second since the reset.
        assert!(!tracker.observe(path, 200, 30, t0 + Duration::from_secs(4)));
        // Unchanged at t=10: seven seconds past the reset, eligible.
        assert!(tracker.observe(path, 200, 30, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn stability_tracker_with_zero_window_is_immediate() {
        let mut tracker = StabilityTracker::new(Duration::ZERO);
        assert!(tracker.observe(Path::new("/w/a.jpg"), 100, 10, Instant::now()));
    }

    #[test]
    fn stability_tracker_prunes_unseen_paths() {
        let mut tracker = StabilityTracker::new(Duration::from_secs(5));
        let now = Instant::now();
        tracker.observe(Path::new("/w/a.jpg"), 100, 10, now);
        tracker.observe(Path::new("/w/b.jpg"), 100, 10, now);

        let mut seen = HashSet::new();
        seen.insert(PathBuf::from("/w/a.jpg"));
        tracker.retain_seen(&seen);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn empty_root_enqueues_nothing() {
        let dir = tempdir().expect("tempdir");
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config_for(dir.path()), log.clone());
        discovery.scan_once();
        assert_eq!(log.stats().total(), 0);
    }

    #[test]
    fn zero_settle_enqueues_on_the_first_pass() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"image").expect("write a.jpg");
        std::fs::write(dir.path().join("skip.xyz"), b"not media").expect("write skip.xyz");

        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config_for(dir.path()), log.clone());
        discovery.scan_once();

        let items = log.snapshot_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].send_kind, SendKind::Image);
        assert!(items[0].source_path.ends_with("a.jpg"));
        assert!(items[0].mtime_nanos.is_some());
    }

    #[test]
    fn settle_window_defers_fresh_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"image").expect("write a.jpg");

        let mut config = config_for(dir.path());
        config.settle = Duration::from_secs(3600);
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config, log.clone());

        discovery.scan_once();
        discovery.scan_once();
        assert_eq!(log.stats().total(), 0, "fresh files must sit out the window");
    }

    #[test]
    fn exclude_wins_over_include() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("keep.jpg"), b"x").expect("write keep");
        std::fs::write(dir.path().join("drop.jpg"), b"x").expect("write drop");

        let mut config = config_for(dir.path());
        config.include = vec!["*.jpg".to_string()];
        config.exclude = vec!["drop*".to_string()];
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config, log.clone());
        discovery.scan_once();

        let items = log.snapshot_items();
        assert_eq!(items.len(), 1);
        assert!(items[0].source_path.ends_with("keep.jpg"));
    }

    #[test]
    fn non_recursive_scan_ignores_subdirectories() {
        let dir = tempdir().expect("tempdir");
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).expect("mkdir nested");
        std::fs::write(sub.join("deep.jpg"), b"x").expect("write deep");
        std::fs::write(dir.path().join("top.jpg"), b"x").expect("write top");

        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config_for(dir.path()), log.clone());
        discovery.scan_once();
        assert_eq!(log.stats().total(), 1);

        let mut config = config_for(dir.path());
        config.recursive = true;
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config, log.clone());
        discovery.scan_once();
        assert_eq!(log.stats().total(), 2);
    }

    #[test]
    fn excluded_directories_are_pruned_during_recursion() {
        let dir = tempdir().expect("tempdir");
        let sub = dir.path().join("cache");
        std::fs::create_dir(&sub).expect("mkdir cache");
        std::fs::write(sub.join("tmp.jpg"), b"x").expect("write tmp");
        std::fs::write(dir.path().join("top.jpg"), b"x").expect("write top");

        let mut config = config_for(dir.path());
        config.recursive = true;
        config.exclude = vec!["cache".to_string()];
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config, log.clone());
        discovery.scan_once();

        let items = log.snapshot_items();
        assert_eq!(items.len(), 1);
        assert!(items[0].source_path.ends_with("top.jpg"));
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            writer.start_file(*name, options).expect("start entry");
            writer.write_all(bytes).expect("write entry");
        }
        writer.finish().expect("finish zip");
    }

    #[test]
    fn stable_archives_expand_into_one_item_per_matching_entry() {
        let dir = tempdir().expect("tempdir");
        let zip_path = dir.path().join("bundle.zip");
        write_zip(&zip_path, &[("a.jpg", b"img"), ("notes.txt", b"text")]);

        let mut config = config_for(dir.path());
        config.kinds = vec![SendKind::Image];
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config, log.clone());
        discovery.scan_once();

        let items = log.snapshot_items();
        assert_eq!(items.len(), 1, "only the image entry matches");
        assert_eq!(items[0].source_kind, SourceKind::Archive);
        assert_eq!(items[0].inner_path.as_deref(), Some("a.jpg"));
        assert!(items[0].crc.is_some());

        // A second pass remembers the container and enqueues nothing new.
        discovery.scan_once();
        assert_eq!(log.stats().total(), 1);
    }

    #[test]
    fn archives_with_zero_matching_entries_are_still_remembered() {
        let dir = tempdir().expect("tempdir");
        let zip_path = dir.path().join("docs.zip");
        write_zip(&zip_path, &[("readme.txt", b"text")]);

        let mut config = config_for(dir.path());
        config.kinds = vec![SendKind::Image];
        let log = Arc::new(JobLog::in_memory());
        let mut discovery = make_discovery(config, log.clone());

        discovery.scan_once();
        assert_eq!(log.stats().total(), 0);
        assert_eq!(discovery.expanded_archives.len(), 1);

        discovery.scan_once();
        assert_eq!(log.stats().total(), 0);
        assert_eq!(discovery.expanded_archives.len(), 1);
    }

    #[test]
    fn restart_with_same_queue_file_does_not_duplicate_items() {
        let dir = tempdir().expect("tempdir");
        let watch = dir.path().join("watch");
        std::fs::create_dir(&watch).expect("mkdir watch");
        std::fs::write(watch.join("a.jpg"), b"image").expect("write a.jpg");
        let queue_path = dir.path().join("queue.jsonl");

        {
            let log = Arc::new(JobLog::open(&queue_path, None).expect("open queue"));
            let mut discovery = make_discovery(config_for(&watch), log.clone());
            discovery.scan_once();
            assert_eq!(log.stats().total(), 1);
            log.close();
        }

        // Same path, size and mtime after the "restart": fingerprint matches,
        // enqueue is silently skipped.
        let log = Arc::new(JobLog::open(&queue_path, None).expect("reopen queue"));
        let mut discovery = make_discovery(config_for(&watch), log.clone());
        discovery.scan_once();
        assert_eq!(log.stats().total(), 1);
        log.close();
    }
}
