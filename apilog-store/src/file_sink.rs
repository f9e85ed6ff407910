//! JSON-lines file sink with daily and size-based rotation.
//!
//! Each flushed record becomes one line in `file_path`. At the first write
//! after UTC midnight the current file is renamed with the previous date as
//! suffix (`apilog.jsonl.2025-01-15`); when it grows past
//! `max_file_size_bytes` it is renamed with a timestamp suffix instead. Only
//! the newest `max_rotated_files` rotated files are kept.

use crate::sink::RecordSink;
use apilog_core::config::FileSinkConfig;
use apilog_core::error::ApiLogError;
use apilog_core::record::StoredRecord;
use chrono::{NaiveDate, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Rotating JSON-lines writer.
///
/// Lives on the consumer thread, so no internal locking.
pub struct JsonLinesSink {
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
    current_date: NaiveDate,
    current_size: u64,
}

impl JsonLinesSink {
    /// Open (or create) the target file and any missing parent directories.
    pub fn new(config: FileSinkConfig) -> io::Result<Self> {
        if let Some(parent) = config.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = open_append(&config.file_path)?;
        let current_size = file.metadata()?.len();

        info!(path = %config.file_path.display(), "JSON-lines sink opened");

        Ok(Self {
            config,
            writer: Some(BufWriter::new(file)),
            current_date: Utc::now().date_naive(),
            current_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.file_path
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let today = Utc::now().date_naive();
        let needs_date_rotate = today != self.current_date;
        let needs_size_rotate = self.config.max_file_size_bytes > 0
            && self.current_size >= self.config.max_file_size_bytes;

        if needs_date_rotate || needs_size_rotate {
            self.rotate(needs_date_rotate)?;
            self.current_date = today;
        }

        if self.writer.is_none() {
            self.writer = Some(BufWriter::new(open_append(&self.config.file_path)?));
        }
        if let Some(ref mut writer) = self.writer {
            let bytes = line.as_bytes();
            writer.write_all(bytes)?;
            writer.write_all(b"\n")?;
            self.current_size += bytes.len() as u64 + 1;
        }
        Ok(())
    }

    fn rotate(&mut self, by_date: bool) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let suffix = if by_date {
            self.current_date.format("%Y-%m-%d").to_string()
        } else {
            Utc::now().format("%Y-%m-%d-%H%M%S%.3f").to_string()
        };
        let rotated_path = unique_rotated_path(&self.config.file_path, &suffix);

        if self.config.file_path.exists() {
            match fs::rename(&self.config.file_path, &rotated_path) {
                Ok(()) => info!(
                    from = %self.config.file_path.display(),
                    to = %rotated_path.display(),
                    "Rotated record file"
                ),
                Err(e) => error!(
                    error = %e,
                    from = %self.config.file_path.display(),
                    to = %rotated_path.display(),
                    "Failed to rotate record file"
                ),
            }
        }

        if self.config.max_rotated_files > 0
            && let Err(e) = prune_rotated_files(&self.config.file_path, self.config.max_rotated_files)
        {
            warn!(error = %e, "Failed to prune old record files");
        }

        self.writer = Some(BufWriter::new(open_append(&self.config.file_path)?));
        self.current_size = 0;
        Ok(())
    }
}

impl RecordSink for JsonLinesSink {
    fn write_batch(&mut self, batch: &[StoredRecord]) -> Result<(), ApiLogError> {
        for record in batch {
            let line = record.to_json_line()?;
            self.write_line(&line)?;
        }
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ApiLogError> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `apilog.jsonl` + `2025-01-15` → `apilog.jsonl.2025-01-15`.
fn rotated_file_path(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// Like [`rotated_file_path`], adding `.1`, `.2`, … if the name is taken.
fn unique_rotated_path(base: &Path, suffix: &str) -> PathBuf {
    let candidate = rotated_file_path(base, suffix);
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let candidate = rotated_file_path(base, &format!("{suffix}.{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Remove old rotated files, keeping only the newest `keep`.
fn prune_rotated_files(base_path: &Path, keep: usize) -> io::Result<()> {
    let parent = match base_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base_name = base_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy();

    let mut rotated_files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.len() > base_name.len()
            && name.starts_with(&*base_name)
            && name.as_bytes()[base_name.len()] == b'.'
        {
            rotated_files.push(entry.path());
        }
    }

    // Date suffixes sort lexicographically, oldest first.
    rotated_files.sort();

    if rotated_files.len() > keep {
        let to_remove = rotated_files.len() - keep;
        for path in rotated_files.iter().take(to_remove) {
            debug!(path = %path.display(), "Pruning old record file");
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn config(path: PathBuf, max_size: u64, keep: usize) -> FileSinkConfig {
        FileSinkConfig {
            file_path: path,
            max_file_size_bytes: max_size,
            max_rotated_files: keep,
        }
    }

    fn record(api: &str) -> StoredRecord {
        StoredRecord {
            app_name: "api".into(),
            api: api.into(),
            headers: "{\n    \"accept\": \"*/*\"\n}".into(),
            body: String::new(),
            method: "GET".into(),
            client_ip_address: "10.0.0.1".into(),
            response: String::new(),
            status_code: 200,
            execution_time: 0.5,
            added_on: Utc::now(),
        }
    }

    fn read(path: &Path) -> String {
        let mut content = String::new();
        File::open(path).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn rotated_file_path_appends_suffix() {
        let p = rotated_file_path(Path::new("/var/log/apilog.jsonl"), "2025-01-15");
        assert_eq!(p, PathBuf::from("/var/log/apilog.jsonl.2025-01-15"));
    }

    #[test]
    fn unique_rotated_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("apilog.jsonl");
        File::create(dir.path().join("apilog.jsonl.x")).unwrap();
        assert_eq!(unique_rotated_path(&base, "x"), dir.path().join("apilog.jsonl.x.1"));
    }

    #[test]
    fn writes_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apilog.jsonl");
        let mut sink = JsonLinesSink::new(config(path.clone(), 0, 0)).unwrap();
        sink.write_batch(&[record("/a"), record("/b")]).unwrap();
        sink.write_batch(&[record("/c")]).unwrap();

        let content = read(&path);
        let apis: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<StoredRecord>(l).unwrap().api)
            .collect();
        assert_eq!(apis, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("apilog.jsonl");
        let mut sink = JsonLinesSink::new(config(path.clone(), 0, 0)).unwrap();
        sink.write_batch(&[record("/a")]).unwrap();
        assert!(path.exists());
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn size_rotation_moves_full_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apilog.jsonl");
        let mut sink = JsonLinesSink::new(config(path.clone(), 10, 5)).unwrap();
        sink.write_batch(&[record("/first")]).unwrap();
        sink.write_batch(&[record("/second")]).unwrap();

        let content = read(&path);
        assert!(content.contains("/second"));
        assert!(!content.contains("/first"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn prune_keeps_only_newest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("apilog.jsonl");
        for i in 1..=5 {
            File::create(dir.path().join(format!("apilog.jsonl.2025-01-{i:02}"))).unwrap();
        }
        prune_rotated_files(&base, 2).unwrap();

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["apilog.jsonl.2025-01-04", "apilog.jsonl.2025-01-05"]);
    }

    #[test]
    fn rotation_prunes_beyond_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apilog.jsonl");
        let mut sink = JsonLinesSink::new(config(path.clone(), 1, 2)).unwrap();
        for i in 0..6 {
            sink.write_batch(&[record(&format!("/r{i}"))]).unwrap();
        }
        let rotated = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("apilog.jsonl."))
            .count();
        assert_eq!(rotated, 2);
        assert!(read(&path).contains("/r5"));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apilog.jsonl");
        {
            let mut sink = JsonLinesSink::new(config(path.clone(), 0, 0)).unwrap();
            sink.write_batch(&[record("/a")]).unwrap();
            sink.close().unwrap();
        }
        let mut sink = JsonLinesSink::new(config(path.clone(), 0, 0)).unwrap();
        sink.write_batch(&[record("/b")]).unwrap();
        assert_eq!(read(&path).lines().count(), 2);
    }
}
