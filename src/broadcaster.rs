//! Unix-socket broadcaster: push-only, newline-delimited JSON fanout to
//! connected GUI clients (`spec.md` §4.10).
//!
//! Each client connection gets its own task fed by a bounded `mpsc`
//! channel; a slow or wedged client is disconnected rather than allowed
//! to backpressure the main loop, mirroring the teacher's one-task-per-
//! client socket server shape.

use crate::domain::SocketError;
use crate::model::{RingSample, Sample};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

/// Per-connection outbound queue depth. A client that can't keep up with
/// this many pending messages is dropped.
const CLIENT_QUEUE_DEPTH: usize = 64;

/// One push frame sent to every connected client, wire-tagged by `type`.
///
/// `Sample`'s fields are flattened to the top level to match `spec.md`
/// §4.10's wire shape exactly: `{ type, timestamp, tier, max_score,
/// process_count, rogue_processes, metrics }`, not a nested `sample` object.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Sent exactly once, immediately after a client connects, per the
    /// Open Question resolution recorded in `DESIGN.md`: always present,
    /// never omitted even when the ring buffer is empty.
    InitialState { history: Vec<RingSample> },
    Sample {
        tier: u32,
        #[serde(flatten)]
        sample: Sample,
    },
}

impl From<RingSample> for Frame {
    fn from(ring: RingSample) -> Self {
        Frame::Sample { tier: ring.tier, sample: ring.sample }
    }
}

/// Owns the listening socket and the set of connected clients.
pub struct Broadcaster {
    socket_path: PathBuf,
    clients: broadcast::Sender<String>,
}

impl Broadcaster {
    /// Bind the Unix socket at `socket_path`, removing any stale file left
    /// behind by an unclean previous shutdown.
    ///
    /// # Errors
    /// Returns `SocketError::BindFailed` if the path cannot be bound after
    /// stale-file removal (e.g. permission denied, or another daemon
    /// instance is actually holding it).
    pub fn bind(socket_path: &Path) -> Result<(Self, UnixListener), SocketError> {
        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }
        if let Some(parent) = socket_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let listener = UnixListener::bind(socket_path)
            .map_err(|source| SocketError::BindFailed { path: socket_path.display().to_string(), source })?;
        let (clients, _) = broadcast::channel(CLIENT_QUEUE_DEPTH);
        Ok((Broadcaster { socket_path: socket_path.to_path_buf(), clients }, listener))
    }

    /// Accept one connection and spawn its feeder task. Call in a loop
    /// from the main select.
    pub fn handle_connection(&self, stream: UnixStream, history: Vec<RingSample>) {
        let mut client_rx = self.clients.subscribe();
        tokio::spawn(async move {
            let (queue_tx, mut queue_rx) = mpsc::channel::<String>(CLIENT_QUEUE_DEPTH);

            let initial = Frame::InitialState { history };
            let Ok(line) = serde_json::to_string(&initial) else { return };
            if queue_tx.send(line).await.is_err() {
                return;
            }

            let forward = async {
                loop {
                    match client_rx.recv().await {
                        Ok(line) => {
                            if queue_tx.send(line).await.is_err() {
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("client lagged; dropped {skipped} frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            };

            let (mut reader_half, mut writer_half) = stream.into_split();
            let writer = async move {
                while let Some(line) = queue_rx.recv().await {
                    if writer_half.write_all(line.as_bytes()).await.is_err() {
                        return;
                    }
                    if writer_half.write_all(b"\n").await.is_err() {
                        return;
                    }
                }
            };

            // Clients are write-only from the daemon's perspective; drain
            // any inbound bytes so the peer's close is observed promptly.
            let drain = async move {
                let mut scratch = [0u8; 64];
                loop {
                    match tokio::io::AsyncReadExt::read(&mut reader_half, &mut scratch).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                }
            };

            tokio::select! {
                () = forward => {},
                () = writer => {},
                () = drain => {},
            }
        });
    }

    /// Broadcast one sample to every connected client. Clients with no
    /// buffer room simply miss it (`RecvError::Lagged` on their side);
    /// there are no clients subscribed, this is a no-op.
    pub fn broadcast_sample(&self, sample: RingSample) {
        let frame = Frame::from(sample);
        match serde_json::to_string(&frame) {
            Ok(line) => {
                let _ = self.clients.send(line);
            }
            Err(e) => log::warn!("failed to serialize broadcast frame: {e}"),
        }
    }

    /// Remove the socket file on clean shutdown.
    pub fn shutdown(self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    #[test]
    fn initial_state_frame_serializes_with_tag() {
        let frame = Frame::InitialState { history: Vec::new() };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"initial_state\""));
    }

    #[test]
    fn sample_frame_serializes_with_tag() {
        let ring = RingSample { tier: 0, sample: Sample::new(1.0, 0, vec![]) };
        let frame = Frame::from(ring);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"sample\""));
    }

    #[test]
    fn sample_frame_flattens_fields_to_the_top_level() {
        let ring = RingSample { tier: 2, sample: Sample::new(1.0, 3, vec![]) };
        let frame = Frame::from(ring);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"tier\":2"));
        assert!(json.contains("\"timestamp\":1.0"));
        assert!(json.contains("\"process_count\":3"));
        assert!(json.contains("\"metrics\":"));
        assert!(!json.contains("\"sample\":{"), "sample fields must be flattened, not nested");
    }

    #[tokio::test]
    async fn bind_removes_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pausewatchd.sock");
        std::fs::write(&path, b"stale").unwrap();

        let (broadcaster, _listener) = Broadcaster::bind(&path).unwrap();
        assert!(path.exists());
        broadcaster.shutdown();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn client_receives_initial_state_then_broadcast_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pausewatchd.sock");
        let (broadcaster, listener) = Broadcaster::bind(&path).unwrap();

        let connect_path = path.clone();
        let client = tokio::spawn(async move {
            let stream = UnixStream::connect(&connect_path).await.unwrap();
            let mut reader = tokio::io::BufReader::new(stream);
            let mut first_line = String::new();
            tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut first_line).await.unwrap();
            let mut second_line = String::new();
            tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut second_line).await.unwrap();
            (first_line, second_line)
        });

        let (stream, _addr) = listener.accept().await.unwrap();
        broadcaster.handle_connection(stream, vec![]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        broadcaster.broadcast_sample(RingSample { tier: 0, sample: Sample::new(2.0, 1, vec![]) });

        let (first, second) = tokio::time::timeout(std::time::Duration::from_secs(2), client).await.unwrap().unwrap();
        assert!(first.contains("initial_state"));
        assert!(second.contains("\"type\":\"sample\""));
    }
}
