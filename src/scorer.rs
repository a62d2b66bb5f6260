//! Pure scoring function: `(ProcessMetrics, &Config) -> (score, categories)`.
//!
//! No I/O, no shared state — total and deterministic, per `spec.md` §4.4.

use crate::config::{Config, Normalization};
use crate::domain::{Categories, Category, SchedState};
use crate::model::ProcessMetrics;

fn clamp01(value: f64, low: f64, high: f64) -> f64 {
    if (high - low).abs() < f64::EPSILON {
        return 0.0;
    }
    ((value - low) / (high - low)).clamp(0.0, 1.0)
}

/// Computes a factor's clamped contribution and tags `category` whenever
/// the raw value clears the normalization's `low` bound, independent of
/// the factor's weight (`spec.md` §4.4: a zero-weighted factor still
/// produces a category tag for explainability).
fn linear_factor(raw: f64, bounds: Normalization, weight: u32, category: Category, categories: &mut Categories) -> f64 {
    let fraction = clamp01(raw, bounds.low, bounds.high);
    if fraction > 0.0 {
        categories.insert(category);
    }
    fraction * f64::from(weight)
}

/// Score one process against the configured weights and normalization
/// bounds. Returns the rounded, 100-capped total and the set of
/// categories that explain it.
#[must_use]
pub fn score(metrics: &ProcessMetrics, config: &Config) -> (u32, Categories) {
    let weights = &config.scoring.weights;
    let norm = &config.scoring.normalization;
    let mut categories = Categories::new();
    let mut total = 0.0;

    total += linear_factor(metrics.cpu_percent, norm.cpu, weights.cpu, Category::Cpu, &mut categories);

    if metrics.state == SchedState::Stuck {
        // Binary factor: full weight or nothing, but tagged regardless of
        // weight for explainability (mirrors the linear factors' rule).
        total += f64::from(weights.state);
        categories.insert(Category::Stuck);
    }

    #[allow(clippy::cast_precision_loss)]
    {
        total += linear_factor(metrics.resident_bytes as f64, norm.mem, weights.mem, Category::Mem, &mut categories);
        total += linear_factor(
            metrics.compressed_bytes as f64,
            norm.cmprs,
            weights.cmprs,
            Category::Cmprs,
            &mut categories,
        );
        total += linear_factor(
            metrics.pageins as f64,
            norm.pageins,
            weights.pageins,
            Category::Pageins,
            &mut categories,
        );
        total += linear_factor(
            metrics.context_switches as f64,
            norm.csw,
            weights.csw,
            Category::Csw,
            &mut categories,
        );
        total += linear_factor(
            metrics.syscalls_bsd as f64,
            norm.sysbsd,
            weights.sysbsd,
            Category::Sysbsd,
            &mut categories,
        );
        total += linear_factor(
            f64::from(metrics.threads),
            norm.threads,
            weights.threads,
            Category::Threads,
            &mut categories,
        );
    }

    if metrics.pageins > 0 {
        categories.insert(Category::Paging);
    }

    let all_weights_zero = weights.cpu == 0
        && weights.state == 0
        && weights.pageins == 0
        && weights.mem == 0
        && weights.cmprs == 0
        && weights.csw == 0
        && weights.sysbsd == 0
        && weights.threads == 0;
    if all_weights_zero {
        categories.clear();
    }

    let rounded = total.round().clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let capped = rounded as u32;

    (capped, categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;

    fn base_metrics() -> ProcessMetrics {
        ProcessMetrics {
            pid: Pid(1),
            command: "x".to_string(),
            cpu_percent: 0.0,
            state: SchedState::Running,
            resident_bytes: 0,
            compressed_bytes: 0,
            pageins: 0,
            context_switches: 0,
            syscalls_bsd: 0,
            threads: 0,
        }
    }

    #[test]
    fn score_is_total_and_bounded() {
        let config = Config::default();
        let (s, _) = score(&base_metrics(), &config);
        assert!(s <= 100);
    }

    #[test]
    fn cpu_spike_stays_below_tracking_threshold() {
        // Scenario 2 from spec.md §8: three ticks at cpu=95, default weights.
        let config = Config::default();
        let mut metrics = base_metrics();
        metrics.cpu_percent = 95.0;
        let (s, categories) = score(&metrics, &config);
        // (95-10)/(80-10) saturates at 1.0 * 25 = 25
        assert_eq!(s, 25);
        assert!(categories.contains(&Category::Cpu));
        assert!(s < config.tracking_threshold().unwrap());
    }

    #[test]
    fn stuck_state_contributes_full_weight_and_category() {
        let config = Config::default();
        let mut metrics = base_metrics();
        metrics.state = SchedState::Stuck;
        let (s, categories) = score(&metrics, &config);
        assert_eq!(s, config.scoring.weights.state);
        assert!(categories.contains(&Category::Stuck));
    }

    #[test]
    fn pageins_force_paging_category_even_below_low_bound() {
        let config = Config::default();
        let mut metrics = base_metrics();
        metrics.pageins = 1; // below normalization.pageins.low? low=0 so any >0 triggers factor too
        let (_, categories) = score(&metrics, &config);
        assert!(categories.contains(&Category::Paging));
    }

    #[test]
    fn weight_zero_still_tags_category_without_scoring() {
        // threads has weight 0 by default; a clamped-positive thread count
        // should still be tagged for explainability but add nothing to score.
        let config = Config::default();
        let mut metrics = base_metrics();
        metrics.threads = 32;
        let (before, categories) = score(&metrics, &config);
        assert!(categories.contains(&Category::Threads));
        metrics.threads = 1;
        let (after, _) = score(&metrics, &config);
        assert_eq!(before, after);
    }

    #[test]
    fn all_weights_zero_yields_no_categories() {
        let mut config = Config::default();
        config.scoring.weights = crate::config::WeightsConfig { cpu: 0, state: 0, pageins: 0, mem: 0, cmprs: 0, csw: 0, sysbsd: 0, threads: 0 };
        let mut metrics = base_metrics();
        metrics.cpu_percent = 95.0;
        metrics.pageins = 10;
        let (s, categories) = score(&metrics, &config);
        assert_eq!(s, 0);
        assert!(categories.is_empty());
    }
}
