//! Boot-time oracle: a single stable integer identifying the current OS
//! boot epoch (`spec.md` §4.2).
//!
//! Open Question resolved in `DESIGN.md`: uses the birth time of a
//! stable, OS-managed runtime directory, falling back to its modified
//! time on filesystems that don't report `btime`.

use crate::domain::BootTime;
use std::path::Path;

const RUNTIME_DIR: &str = "/var/run";

/// Fetch the current boot epoch. Stable within one daemon lifetime,
/// changes across reboots.
///
/// # Errors
/// Fatal at startup if `RUNTIME_DIR` cannot be stat'd at all — this
/// indicates the platform doesn't support the assumption this oracle
/// relies on.
pub fn current_boot_time() -> std::io::Result<BootTime> {
    boot_time_of(Path::new(RUNTIME_DIR))
}

fn boot_time_of(path: &Path) -> std::io::Result<BootTime> {
    let metadata = std::fs::metadata(path)?;
    let stamp = metadata
        .created()
        .or_else(|_| metadata.modified())?;
    let secs = stamp
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Ok(BootTime(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_time_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let a = boot_time_of(dir.path()).unwrap();
        let b = boot_time_of(dir.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_path_is_an_error() {
        let result = boot_time_of(Path::new("/nonexistent/pausewatchd/probe"));
        assert!(result.is_err());
    }
}
