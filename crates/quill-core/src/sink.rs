//! Size-limited file sink with rotation.
//!
//! A [`FileSink`] owns at most one OS file handle, opened lazily on the
//! first write. It tracks how many bytes it has written since the handle
//! was opened (or the file was last truncated or rotated) and enforces an
//! optional size cap: a write that would push the file past the cap first
//! truncates the file in place or rotates it to a numbered backup,
//! depending on configuration.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::QuillError;

/// Highest numbered backup slot probed during rotation.
const MAX_BACKUP_SLOTS: u32 = 100;

/// Append-only file handle with size tracking and rotation.
pub struct FileSink {
    path: PathBuf,
    max_size: u64,
    truncate_on_full: bool,
    file: Option<File>,
    size: u64,
}

impl FileSink {
    /// Sink for `path` with no size cap.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limits(path, 0, false)
    }

    /// Sink for `path` capped at `max_size` bytes (0 = unlimited).
    ///
    /// With `truncate_on_full` set, a full file is truncated to zero bytes
    /// in place; otherwise it is renamed to the first free `<path>.<n>`
    /// backup and a fresh file is opened at the original path.
    pub fn with_limits(path: impl Into<PathBuf>, max_size: u64, truncate_on_full: bool) -> Self {
        Self {
            path: path.into(),
            max_size,
            truncate_on_full,
            file: None,
            size: 0,
        }
    }

    /// Target path of this sink.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written since the handle was opened or the file was last
    /// truncated or rotated. Includes pre-existing file content picked up
    /// at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append `payload` to the file, opening the handle if necessary.
    ///
    /// Returns the number of bytes written. The tracked size is advanced by
    /// every byte that reached the file even when the write fails partway,
    /// so a later retry sees an accurate picture.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize, QuillError> {
        self.ensure_open()?;

        let incoming = payload.len() as u64;
        if self.max_size != 0 {
            if incoming > self.max_size {
                return Err(QuillError::Oversized {
                    len: incoming,
                    max: self.max_size,
                });
            }
            if self.size + incoming > self.max_size {
                if self.truncate_on_full {
                    self.truncate()?;
                } else {
                    self.rotate()?;
                }
            }
        }

        self.append(payload)
    }

    /// Release the file handle. Closing an already closed sink is a no-op.
    pub fn close(&mut self) -> Result<(), QuillError> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn ensure_open(&mut self) -> Result<(), QuillError> {
        if self.file.is_some() {
            return Ok(());
        }
        if self.path.as_os_str().is_empty() {
            return Err(QuillError::Config("file sink has no target path".into()));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
                // Log directories are shared by every writer on the host;
                // a chmod failure is not fatal.
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o777));
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Resume the tracked size from whatever the file already holds, so
        // a restart keeps honoring the cap.
        let size = file.metadata()?.len();

        self.file = Some(file);
        self.size = size;
        Ok(())
    }

    fn append(&mut self, payload: &[u8]) -> Result<usize, QuillError> {
        let Some(file) = self.file.as_mut() else {
            return Err(QuillError::Config("file sink handle is closed".into()));
        };

        let mut written = 0;
        while written < payload.len() {
            match file.write(&payload[written..]) {
                Ok(0) => {
                    return Err(QuillError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "file refused additional bytes",
                    )));
                }
                Ok(n) => {
                    written += n;
                    self.size += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(written)
    }

    fn truncate(&mut self) -> Result<(), QuillError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.set_len(0)?;
        self.size = 0;
        debug!(path = %self.path.display(), "truncated full log file");
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), QuillError> {
        self.close()?;
        let backup = self.backup_path()?;
        fs::rename(&self.path, &backup)?;
        debug!(
            from = %self.path.display(),
            to = %backup.display(),
            "rotated full log file"
        );
        // A fresh file appears at the original path; a failed reopen leaves
        // the sink closed and the next write retries from scratch.
        self.ensure_open()
    }

    /// First unused `<path>.<n>` for n in 1..=100.
    fn backup_path(&self) -> Result<PathBuf, QuillError> {
        for n in 1..=MAX_BACKUP_SLOTS {
            let mut name = self.path.as_os_str().to_os_string();
            name.push(format!(".{n}"));
            let candidate = PathBuf::from(name);
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(QuillError::Rotation(format!(
            "all {} backup slots for {} are taken",
            MAX_BACKUP_SLOTS,
            self.path.display()
        )))
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_is_config_error() {
        let mut sink = FileSink::new("");
        match sink.write(b"hello") {
            Err(QuillError::Config(_)) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_lazy_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.log");
        let mut sink = FileSink::new(&path);
        sink.write(b"first\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first\n");
    }

    #[test]
    fn test_size_resumes_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"previous run\n").unwrap();

        let mut sink = FileSink::new(&path);
        sink.write(b"this run\n").unwrap();
        assert_eq!(sink.size(), "previous run\nthis run\n".len() as u64);
    }

    #[test]
    fn test_oversized_payload_rejected_without_size_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileSink::with_limits(&path, 8, false);

        match sink.write(b"way past the cap") {
            Err(QuillError::Oversized { len, max }) => {
                assert_eq!(len, 16);
                assert_eq!(max, 8);
            }
            other => panic!("expected Oversized, got {other:?}"),
        }
        assert_eq!(sink.size(), 0);
    }

    #[test]
    fn test_rotation_preserves_old_content_in_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileSink::with_limits(&path, 10, false);

        sink.write(b"0123456789").unwrap();
        sink.write(b"abcde").unwrap();

        let backup = dir.path().join("app.log.1");
        assert_eq!(std::fs::read(&backup).unwrap(), b"0123456789");
        assert_eq!(std::fs::read(&path).unwrap(), b"abcde");
        assert_eq!(sink.size(), 5);
    }

    #[test]
    fn test_truncation_mode_leaves_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileSink::with_limits(&path, 10, true);

        sink.write(b"0123456789").unwrap();
        sink.write(b"abcde").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"abcde");
        assert!(!dir.path().join("app.log.1").exists());
    }

    #[test]
    fn test_backup_scan_skips_taken_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(dir.path().join("app.log.1"), b"old one").unwrap();
        std::fs::write(dir.path().join("app.log.2"), b"old two").unwrap();

        let mut sink = FileSink::with_limits(&path, 10, false);
        sink.write(b"0123456789").unwrap();
        sink.write(b"abcde").unwrap();

        assert_eq!(std::fs::read(dir.path().join("app.log.3")).unwrap(), b"0123456789");
        assert_eq!(std::fs::read(dir.path().join("app.log.1")).unwrap(), b"old one");
        assert_eq!(std::fs::read(dir.path().join("app.log.2")).unwrap(), b"old two");
    }

    #[test]
    fn test_close_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("app.log"));
        sink.write(b"line\n").unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn test_write_after_close_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileSink::new(&path);
        sink.write(b"one\n").unwrap();
        sink.close().unwrap();
        sink.write(b"two\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"one\ntwo\n");
    }
}
