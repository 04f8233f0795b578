use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;

use super::domain::SendKind;

static IMAGE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "heic", "avif",
    ]
    .into_iter()
    .collect()
});

static VIDEO_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mp4", "mkv", "mov", "avi", "webm", "m4v", "ts", "flv", "wmv", "3gp", "mpg", "mpeg",
    ]
    .into_iter()
    .collect()
});

static AUDIO_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["mp3", "flac", "ogg", "oga", "wav", "m4a", "aac", "opus", "wma"]
        .into_iter()
        .collect()
});

static DOCUMENT_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "epub", "mobi", "csv",
    ]
    .into_iter()
    .collect()
});

const ARCHIVE_EXTENSION: &str = "zip";

pub(crate) fn classify_extension(ext: &str) -> Option<SendKind> {
    let ext = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(ext.as_str()) {
        Some(SendKind::Image)
    } else if VIDEO_EXTENSIONS.contains(ext.as_str()) {
        Some(SendKind::Video)
    } else if AUDIO_EXTENSIONS.contains(ext.as_str()) {
        Some(SendKind::Audio)
    } else if DOCUMENT_EXTENSIONS.contains(ext.as_str()) {
        Some(SendKind::Document)
    } else {
        None
    }
}

/// Classify by lowercase extension. Paths without an extension are not media.
pub(crate) fn classify_path(path: &Path) -> Option<SendKind> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(classify_extension)
}

/// Entry names inside archives carry forward slashes regardless of platform.
pub(crate) fn classify_entry_name(name: &str) -> Option<SendKind> {
    name.rsplit('.')
        .next()
        .filter(|ext| ext.len() < name.len())
        .and_then(classify_extension)
}

pub(crate) fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_path(Path::new("/w/photo.JPG")), Some(SendKind::Image));
        assert_eq!(classify_path(Path::new("/w/clip.Mkv")), Some(SendKind::Video));
        assert_eq!(classify_path(Path::new("/w/track.FLAC")), Some(SendKind::Audio));
        assert_eq!(classify_path(Path::new("/w/paper.pdf")), Some(SendKind::Document));
        assert_eq!(classify_path(Path::new("/w/unknown.xyz")), None);
        assert_eq!(classify_path(Path::new("/w/no_extension")), None);
    }

    #[test]
    fn archive_detection_only_matches_zip() {
        assert!(is_archive_path(Path::new("/w/bundle.zip")));
        assert!(is_archive_path(Path::new("/w/bundle.ZIP")));
        assert!(!is_archive_path(Path::new("/w/bundle.tar")));
        assert!(!is_archive_path(Path::new("/w/zip")));
    }

    #[test]
    fn entry_names_classify_like_paths() {
        assert_eq!(classify_entry_name("photos/a.jpg"), Some(SendKind::Image));
        assert_eq!(classify_entry_name("docs/readme.txt"), Some(SendKind::Document));
        assert_eq!(classify_entry_name("noext"), None);
    }
}
