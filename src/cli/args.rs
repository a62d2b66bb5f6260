//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pausewatchd",
    about = "Host-local daemon that watches for stressor processes and self-latency pauses",
    after_help = "\
EXAMPLES:
    pausewatchd                              Run as a daemon with default paths
    pausewatchd --foreground -q               Run attached to the terminal, quiet
    pausewatchd --config ~/alt-config.toml    Run with an alternate config file"
)]
pub struct Args {
    /// Path to the TOML config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for the event database and PID file
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path of the Unix socket GUI clients connect to
    #[arg(long, value_name = "PATH")]
    pub socket_path: Option<PathBuf>,

    /// Stay attached to the terminal instead of detaching
    #[arg(long)]
    pub foreground: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_builds_without_panicking() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_are_all_none_or_false() {
        let args = Args::parse_from(["pausewatchd"]);
        assert!(args.config.is_none());
        assert!(args.data_dir.is_none());
        assert!(args.socket_path.is_none());
        assert!(!args.foreground);
        assert!(!args.quiet);
    }

    #[test]
    fn flags_parse() {
        let args = Args::parse_from(["pausewatchd", "--foreground", "-q", "--config", "/tmp/c.toml"]);
        assert!(args.foreground);
        assert!(args.quiet);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
