//! Advisory-locked PID file guarding single-instance execution
//! (`spec.md` §4.11).
//!
//! A stale file left by a crashed daemon is reclaimed automatically: the
//! lock is the source of truth, not the file's mere existence.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// A held, locked PID file. Dropping this without calling [`PidFile::remove`]
/// still releases the OS lock (advisory locks are released on close), but
/// leaves the file on disk — callers should always call `remove` on a
/// clean shutdown path.
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Create and exclusively lock the PID file at `path`, writing the
    /// current process ID into it.
    ///
    /// # Errors
    /// Returns an error if another live instance already holds the lock
    /// (`try_lock_exclusive` fails), or if the file cannot be opened or
    /// written. A file left over from a crashed daemon is silently
    /// reclaimed, since only the lock — not the file's presence —
    /// indicates another instance is running.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            io::Error::new(io::ErrorKind::AddrInUse, format!("another pausewatchd instance holds {}", path.display()))
        })?;

        file.set_len(0)?;
        use std::io::Write;
        let mut handle = &file;
        write!(handle, "{}", std::process::id())?;
        handle.flush()?;

        Ok(PidFile { path: path.to_path_buf(), file })
    }

    /// Release the lock and remove the file. Idempotent.
    pub fn remove(self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Default PID file path under the user's data directory.
#[must_use]
pub fn default_pidfile_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("pausewatchd").join("daemon.pid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        let pidfile = PidFile::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        pidfile.remove();
    }

    #[test]
    fn second_acquire_while_first_is_held_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        let first = PidFile::acquire(&path).unwrap();
        let second = PidFile::acquire(&path);
        assert!(second.is_err());
        first.remove();
    }

    #[test]
    fn remove_allows_reacquisition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        let first = PidFile::acquire(&path).unwrap();
        first.remove();
        let second = PidFile::acquire(&path);
        assert!(second.is_ok());
    }

    #[test]
    fn stale_file_without_a_live_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "999999").unwrap();
        let pidfile = PidFile::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        pidfile.remove();
    }
}
