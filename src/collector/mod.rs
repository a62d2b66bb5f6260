//! Spawns `top(1)` in streaming mode and yields one parsed sample block
//! per tick (`spec.md` §4.6).

pub mod parser;

use crate::domain::CollectorError;
use crate::model::{ProcessMetrics, SystemMetrics};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

const TOP_ARGS: &[&str] = &[
    "-l", "0",
    "-s", "1",
    "-stats", "pid,command,cpu,state,rsize,cmprs,pgin,csw,sysbsd,th",
];

/// A running `top` subprocess, yielding one parsed row set per sample
/// block.
pub struct TopCollector {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl TopCollector {
    /// Spawn `top` in streaming mode.
    ///
    /// # Errors
    /// Returns `CollectorError::SpawnFailed` if `top` cannot be spawned
    /// (missing binary, permission denied) — a fatal startup error per
    /// `spec.md` §4.6.
    pub fn spawn() -> Result<Self, CollectorError> {
        let mut child = Command::new("top")
            .args(TOP_ARGS)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(CollectorError::SpawnFailed)?;

        let stdout = child.stdout.take().ok_or(CollectorError::EndOfStream)?;
        let lines = BufReader::new(stdout).lines();

        Ok(TopCollector { child, lines })
    }

    /// Read and parse the next complete sample block.
    ///
    /// Returns `Ok(None)` when the subprocess's stdout has ended (the
    /// caller decides whether to restart, per `spec.md` §4.6).
    ///
    /// # Errors
    /// Propagates I/O errors reading from the child's stdout.
    pub async fn next_sample(&mut self) -> Result<Option<(Vec<ProcessMetrics>, SystemMetrics)>, CollectorError> {
        let mut block: Vec<String> = Vec::new();
        loop {
            match self.lines.next_line().await? {
                None => {
                    return if block.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some((parser::parse_block(&block), parser::parse_system_metrics(&block))))
                    };
                }
                Some(line) => {
                    if line.trim().is_empty() {
                        if !block.is_empty() {
                            return Ok(Some((parser::parse_block(&block), parser::parse_system_metrics(&block))));
                        }
                        // Leading blank lines between blocks are ignored.
                    } else {
                        block.push(line);
                    }
                }
            }
        }
    }

    /// Send a termination signal and wait, bounded, for the subprocess
    /// to exit (`spec.md` §4.6, clean shutdown).
    #[allow(unsafe_code)]
    pub async fn shutdown(mut self, timeout: std::time::Duration) {
        let pid = self.child.id();
        if let Some(pid) = pid {
            // SAFETY: sends SIGTERM to our own child process by pid.
            unsafe {
                libc::kill(i32::try_from(pid).unwrap_or(0), libc::SIGTERM);
            }
        }
        if tokio::time::timeout(timeout, self.child.wait()).await.is_err() {
            log::warn!("top subprocess did not exit within {timeout:?}; killing");
            let _ = self.child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parser;

    #[test]
    fn top_args_request_the_expected_columns() {
        assert!(super::TOP_ARGS.contains(&"pid,command,cpu,state,rsize,cmprs,pgin,csw,sysbsd,th"));
    }

    #[test]
    fn parse_block_is_reexported_and_usable_standalone() {
        let block = vec![
            "PID COMMAND %CPU STATE RSIZE CMPRS PGIN CSW SYSBSD TH".to_string(),
            "1 init 0.0 sleeping 1M 0B 0 10 2 1".to_string(),
        ];
        assert_eq!(parser::parse_block(&block).len(), 1);
    }
}
