use std::fs;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Reads and deserializes a JSON file into the specified type.
pub fn read_json_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open config file {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("failed to parse JSON from {}", path.display()))
}

/// Writes and serializes a value to a JSON file atomically.
///
/// Creates the parent directory if it doesn't exist, writes to a temporary
/// file first, then atomically renames it to the target path.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create temp file {}", tmp_path.display()))?;
    serde_json::to_writer_pretty(&file, value)
        .with_context(|| format!("failed to write JSON to {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "failed to atomically rename {} -> {}",
            tmp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn json_files_round_trip_atomically() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("sample.json");
        let value = Sample {
            name: "queue".to_string(),
            count: 7,
        };

        write_json_file(&path, &value).expect("write sample");
        assert!(!path.with_extension("tmp").exists(), "temp file must be renamed away");

        let loaded: Sample = read_json_file(&path).expect("read sample");
        assert_eq!(loaded, value);
    }

    #[test]
    fn reading_a_missing_file_names_the_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing.json");
        let err = read_json_file::<Sample>(&path).expect_err("missing file");
        assert!(err.to_string().contains("missing.json"));
    }
}
