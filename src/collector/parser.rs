//! Pure parsing of `top(1)` sample blocks into [`ProcessMetrics`] rows.
//!
//! `top -l 0 -stats pid,command,cpu,state,rsize,cmprs,pgin,csw,sysbsd,th`
//! emits, once per second, a short preamble (load average, process
//! counts, ...), a header line starting with `PID`, one row per process,
//! then a blank line before the next block. Only the header-to-blank-line
//! span is parsed; everything else is ignored.

use crate::domain::{Pid, SchedState};
use crate::model::{ProcessMetrics, SystemMetrics};

/// Parse a binary size suffix (`0B`, `2000M`, `1.5G`, ...) as multiples
/// of 1024, per `spec.md` §4.6.
#[must_use]
pub fn parse_size_bytes(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return None;
    }
    let (number_part, multiplier) = match raw.chars().last()? {
        'B' | 'b' => (&raw[..raw.len() - 1], 1u64),
        'K' | 'k' => (&raw[..raw.len() - 1], 1024u64),
        'M' | 'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        'G' | 'g' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        'T' | 't' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024 * 1024),
        _ => (raw, 1u64),
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    number_part.parse::<f64>().ok().map(|value| (value * multiplier as f64) as u64)
}

fn parse_count(raw: &str) -> u64 {
    raw.trim().trim_end_matches('+').parse().unwrap_or(0)
}

/// Parse one whitespace-separated `top` row in the fixed column order
/// `pid command %cpu state rsize cmprs pgin csw sysbsd th`.
///
/// `command` may itself contain no spaces (as `top` truncates/quotes it);
/// rows with too few columns are rejected.
#[must_use]
pub fn parse_row(line: &str) -> Option<ProcessMetrics> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 10 {
        return None;
    }
    let pid: u32 = cols[0].parse().ok()?;
    let command = cols[1].to_string();
    let cpu_percent: f64 = cols[2].trim_end_matches('%').parse().ok()?;
    let state = SchedState::from_top_code(cols[3]);
    let resident_bytes = parse_size_bytes(cols[4])?;
    let compressed_bytes = parse_size_bytes(cols[5]).unwrap_or(0);
    let pageins = parse_count(cols[6]);
    let context_switches = parse_count(cols[7]);
    let syscalls_bsd = parse_count(cols[8]);
    let threads: u32 = cols[9].parse().unwrap_or(1);

    Some(ProcessMetrics {
        pid: Pid(pid),
        command,
        cpu_percent,
        state,
        resident_bytes,
        compressed_bytes,
        pageins,
        context_switches,
        syscalls_bsd,
        threads,
    })
}

/// Parse the `Load Avg: 1.23, 1.45, 1.50` preamble line, if present.
/// Missing or malformed load-average figures default to `0.0` rather than
/// dropping the whole block; the per-process rows are what matters.
#[must_use]
pub fn parse_system_metrics(block: &[String]) -> SystemMetrics {
    let Some(line) = block.iter().find(|line| line.trim_start().starts_with("Load Avg:")) else {
        return SystemMetrics::default();
    };
    let Some(figures) = line.split_once(':').map(|(_, rest)| rest) else {
        return SystemMetrics::default();
    };
    let mut parts = figures.split(',').map(|p| p.trim().parse::<f64>().unwrap_or(0.0));
    SystemMetrics {
        load_avg_1m: parts.next().unwrap_or(0.0),
        load_avg_5m: parts.next().unwrap_or(0.0),
        load_avg_15m: parts.next().unwrap_or(0.0),
    }
}

/// Parse one complete sample block (preamble + header + rows) into the
/// rows that parsed successfully. Malformed rows are skipped, not fatal.
#[must_use]
pub fn parse_block(block: &[String]) -> Vec<ProcessMetrics> {
    let header_index = block.iter().position(|line| line.trim_start().starts_with("PID"));
    let Some(header_index) = header_index else {
        return Vec::new();
    };

    block[header_index + 1..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_row(line);
            if parsed.is_none() {
                log::debug!("skipping malformed top row: {line:?}");
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_size_suffixes() {
        assert_eq!(parse_size_bytes("0B"), Some(0));
        assert_eq!(parse_size_bytes("2000M"), Some(2000 * 1024 * 1024));
        assert_eq!(parse_size_bytes("1.5G"), Some((1.5 * 1024.0 * 1024.0 * 1024.0) as u64));
    }

    #[test]
    fn parses_a_complete_row() {
        let row = "1234 myapp 95.2 running 120M 0B 0 150 30 8";
        let metrics = parse_row(row).unwrap();
        assert_eq!(metrics.pid.0, 1234);
        assert_eq!(metrics.command, "myapp");
        assert!((metrics.cpu_percent - 95.2).abs() < f64::EPSILON);
        assert_eq!(metrics.state, SchedState::Running);
        assert_eq!(metrics.resident_bytes, 120 * 1024 * 1024);
        assert_eq!(metrics.threads, 8);
    }

    #[test]
    fn rejects_a_row_with_too_few_columns() {
        assert!(parse_row("1234 myapp").is_none());
    }

    #[test]
    fn block_parsing_skips_preamble_and_stops_at_blank() {
        let block = vec![
            "Processes: 200 total".to_string(),
            "Load Avg: 1.23, 1.45, 1.50".to_string(),
            "PID COMMAND %CPU STATE RSIZE CMPRS PGIN CSW SYSBSD TH".to_string(),
            "1 init 0.0 sleeping 1M 0B 0 10 2 1".to_string(),
            "2 garbage line not enough cols".to_string(),
            "3 stuck_proc 5.0 stuck 2M 0B 0 20 4 2".to_string(),
        ];
        let rows = parse_block(&block);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pid.0, 1);
        assert_eq!(rows[1].pid.0, 3);
    }

    #[test]
    fn block_without_header_yields_no_rows() {
        let block = vec!["garbage".to_string()];
        assert!(parse_block(&block).is_empty());
    }

    #[test]
    fn parses_load_average_from_the_preamble() {
        let block = vec!["Load Avg: 1.23, 1.45, 1.50".to_string()];
        let metrics = parse_system_metrics(&block);
        assert!((metrics.load_avg_1m - 1.23).abs() < f64::EPSILON);
        assert!((metrics.load_avg_5m - 1.45).abs() < f64::EPSILON);
        assert!((metrics.load_avg_15m - 1.50).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_load_average_defaults_to_zero() {
        let block = vec!["Processes: 200 total".to_string()];
        assert_eq!(parse_system_metrics(&block), SystemMetrics::default());
    }
}
