//! pausewatchd entry point: wires the collector, scorer, tracker,
//! broadcaster, and forensics runner into the single cooperative main
//! loop described in `spec.md` §4.11/§5.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use pausewatchd::broadcaster::Broadcaster;
use pausewatchd::cli::Args;
use pausewatchd::collector::TopCollector;
use pausewatchd::config::Config;
use pausewatchd::domain::BootTime;
use pausewatchd::forensics::{self, ForensicsBandTracker, Trigger};
use pausewatchd::pidfile::PidFile;
use pausewatchd::ring_buffer::RingBuffer;
use pausewatchd::storage::Storage;
use pausewatchd::tracker::ProcessTracker;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};

const CHILD_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const RETENTION_CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const BROADCAST_HISTORY_SECONDS: usize = 3;

fn unix_now() -> f64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config_path = args.config.clone().unwrap_or_else(pausewatchd::config::default_config_path);
    let mut config = Config::load(&config_path).context("failed to load configuration")?;

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("pausewatchd"));
    std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

    let pidfile_path = data_dir.join("daemon.pid");
    let pidfile = PidFile::acquire(&pidfile_path).context("another pausewatchd instance is already running")?;

    let db_path = data_dir.join("data.db");
    let storage = Storage::open(&db_path).context("failed to open database")?;

    let boot_time = BootTime(pausewatchd::boot_time::current_boot_time().context("failed to determine boot time")?.0);
    let mut tracker = ProcessTracker::new(storage.clone(), boot_time).await.context("failed to recover open events")?;
    info!("recovered {} open event(s) for {boot_time}", tracker.tracked_count());

    let socket_path =
        args.socket_path.clone().unwrap_or_else(|| data_dir.join("daemon.sock"));
    let (broadcaster, listener) = Broadcaster::bind(&socket_path).context("failed to bind broadcaster socket")?;

    let mut collector = TopCollector::spawn().context("failed to spawn top collector")?;

    let mut ring_buffer = RingBuffer::new(config.sampling.ring_buffer_seconds, config.sampling.rate_hz);

    let nominal_period = Duration::from_secs_f64(1.0 / f64::from(config.sampling.rate_hz.max(1)));
    let mut t_last = Instant::now();
    let mut forensics_band = ForensicsBandTracker::default();
    let mut retention_tick = tokio::time::interval(RETENTION_CHECK_INTERVAL);
    retention_tick.reset();

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;

    info!("pausewatchd started, pid {}", std::process::id());

    'main: loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let history = ring_buffer.last_seconds(BROADCAST_HISTORY_SECONDS);
                        broadcaster.handle_connection(stream, history);
                    }
                    Err(e) => warn!("failed to accept client connection: {e}"),
                }
            }

            sample = collector.next_sample() => {
                let t_now = Instant::now();
                let actual_interval = t_now.duration_since(t_last);
                t_last = t_now;

                match sample {
                    Ok(Some((rows, system_metrics))) => {
                        let now = unix_now();
                        let scored = pausewatchd::selector::select_rogues(&rows, &config, now);
                        let sample = pausewatchd::model::Sample::new(now, rows.len(), scored.clone())
                            .with_metrics(system_metrics);

                        ring_buffer.push(sample.clone(), 0);
                        broadcaster.broadcast_sample(pausewatchd::model::RingSample { tier: 0, sample });
                        tracker.update(&scored, &config, now).await;

                        let pause_threshold = nominal_period.mul_f64(config.sampling.pause_threshold_ratio);
                        let paused = actual_interval > pause_threshold;
                        let entered_forensics_band = match config.forensics_threshold() {
                            Ok(threshold) => forensics_band.update(&scored, threshold),
                            Err(e) => {
                                warn!("forensics_band threshold unavailable: {e}");
                                false
                            }
                        };

                        if paused || entered_forensics_band {
                            let trigger = if paused { Trigger::Pause } else { Trigger::ForensicsBandEntry };
                            ring_buffer.snapshot_processes(trigger.tag());
                            let frozen = ring_buffer.freeze();
                            ring_buffer.clear_snapshots();
                            let open_ids = tracker.open_event_ids();

                            let storage = storage.clone();
                            let data_dir = data_dir.clone();
                            tokio::spawn(async move {
                                forensics::run_forensics(&storage, &frozen, &open_ids, trigger, &data_dir, now).await;
                            });
                        }
                    }
                    Ok(None) => {
                        warn!("top subprocess ended; restarting collector");
                        match TopCollector::spawn() {
                            Ok(new_collector) => collector = new_collector,
                            Err(e) => {
                                warn!("failed to restart collector: {e}; shutting down");
                                break 'main;
                            }
                        }
                    }
                    Err(e) => warn!("collector error: {e}"),
                }
            }

            _ = retention_tick.tick() => {
                let cutoff = unix_now() - f64::from(config.retention.events_days) * 86_400.0;
                match storage.prune_events_older_than(cutoff).await {
                    Ok(pruned) if pruned > 0 => info!("pruned {pruned} expired event(s)"),
                    Ok(_) => {}
                    Err(e) => warn!("retention prune failed: {e}"),
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM; shutting down");
                break 'main;
            }
            _ = sigint.recv() => {
                info!("received SIGINT; shutting down");
                break 'main;
            }
            _ = sighup.recv() => {
                match config.reload(&config_path) {
                    Ok(()) => info!("configuration reloaded"),
                    Err(e) => warn!("failed to reload configuration: {e}"),
                }
            }
        }
    }

    collector.shutdown(CHILD_SHUTDOWN_TIMEOUT).await;
    broadcaster.shutdown();
    pidfile.remove();

    info!("pausewatchd shutdown complete");
    Ok(())
}
