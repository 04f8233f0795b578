use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use zip::result::ZipError;

/// Metadata of one regular archive entry, read without decompressing.
#[derive(Debug, Clone)]
pub struct ArchiveEntryMeta {
    pub name: String,
    pub size: u64,
    pub crc32: u32,
}

/// List regular entries of a zip archive. Works for encrypted archives too;
/// only reading bytes needs a password.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntryMeta>> {
    let file =
        File::open(path).with_context(|| format!("failed to open archive {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read archive {}", path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .with_context(|| format!("failed to read entry {index} of {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        entries.push(ArchiveEntryMeta {
            name: entry.name().to_string(),
            size: entry.size(),
            crc32: entry.crc32(),
        });
    }
    Ok(entries)
}

/// Read the bytes of one entry, trying the configured passwords in order
/// when the archive demands one.
pub fn read_entry(path: &Path, inner: &str, passwords: &[String]) -> Result<Vec<u8>> {
    let file =
        File::open(path).with_context(|| format!("failed to open archive {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read archive {}", path.display()))?;
    let index = archive
        .index_for_name(inner)
        .ok_or_else(|| anyhow!("entry {inner} not found in {}", path.display()))?;

    match archive.by_index(index) {
        Ok(mut entry) => {
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("failed to read {inner} from {}", path.display()))?;
            return Ok(bytes);
        }
        // Password-protected entry; fall through to the password list.
        Err(ZipError::UnsupportedArchive(ZipError::PASSWORD_REQUIRED)) => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to open {inner} in {}", path.display()));
        }
    }

    for password in passwords {
        match archive.by_index_decrypt(index, password.as_bytes()) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut bytes)
                    .with_context(|| format!("failed to read {inner} from {}", path.display()))?;
                return Ok(bytes);
            }
            Err(ZipError::InvalidPassword) => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to decrypt {inner} in {}", path.display()));
            }
        }
    }

    bail!(
        "no configured password opens {inner} in {} ({} tried)",
        path.display(),
        passwords.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_plain_zip(path: &Path) {
        let file = File::create(path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.add_directory("photos/", options).expect("add dir");
        writer.start_file("photos/a.jpg", options).expect("start a.jpg");
        writer.write_all(b"jpeg bytes").expect("write a.jpg");
        writer.start_file("notes.txt", options).expect("start notes");
        writer.write_all(b"hello").expect("write notes");
        writer.finish().expect("finish zip");
    }

    #[test]
    fn list_entries_skips_directories_and_reports_sizes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        write_plain_zip(&path);

        let entries = list_entries(&path).expect("list entries");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["photos/a.jpg", "notes.txt"]);
        assert_eq!(entries[0].size, 10);
        assert_eq!(entries[1].size, 5);
    }

    #[test]
    fn listing_twice_yields_identical_crcs() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        write_plain_zip(&path);

        let first = list_entries(&path).expect("first listing");
        let second = list_entries(&path).expect("second listing");
        assert_eq!(first[0].crc32, second[0].crc32);
        assert_ne!(first[0].crc32, 0, "stored entries carry a real CRC");
    }

    #[test]
    fn read_entry_round_trips_bytes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bundle.zip");
        write_plain_zip(&path);

        let bytes = read_entry(&path, "photos/a.jpg", &[]).expect("read entry");
        assert_eq!(bytes, b"jpeg bytes");

        let missing = read_entry(&path, "photos/missing.jpg", &[]);
        assert!(missing.is_err());
    }

    #[test]
    fn encrypted_entries_need_a_matching_password() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("secret.zip");
        {
            let file = File::create(&path).expect("create zip");
            let mut writer = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .with_aes_encryption(zip::AesMode::Aes256, "hunter2");
            writer.start_file("a.jpg", options).expect("start entry");
            writer.write_all(b"classified jpeg").expect("write entry");
            writer.finish().expect("finish zip");
        }

        let err = read_entry(&path, "a.jpg", &["wrong".to_string()]).expect_err("wrong password");
        assert!(
            err.to_string().contains("no configured password"),
            "unexpected error: {err:#}"
        );

        let bytes = read_entry(
            &path,
            "a.jpg",
            &["wrong".to_string(), "hunter2".to_string()],
        )
        .expect("second password matches");
        assert_eq!(bytes, b"classified jpeg");
    }
}
