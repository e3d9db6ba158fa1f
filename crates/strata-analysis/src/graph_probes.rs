use serde_json::json;
use strata_config::MonitorConfig;
use strata_core::MetricName;
use strata_store::{DriftStore, EdgeStrengthStats, StoreError};

use crate::evaluator::{MetricResult, build_rate_metric, insufficient_metric};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemergeStats {
    pub rate: f64,
    pub total: i64,
    pub remerged: i64,
    pub new_aliases: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeShiftStats {
    pub shift: f64,
    pub samples: i64,
    pub current: EdgeStrengthStats,
    pub previous: EdgeStrengthStats,
}

pub fn probe_remerge_rate(
    store: &dyn DriftStore,
    start: i64,
    end: i64,
) -> Result<RemergeStats, StoreError> {
    let total = store.count_global_concepts_updated(start, end)?;
    let remerged = store.count_global_remerged_concepts(start, end)?;
    let new_aliases = match store.count_global_new_aliases(start, end) {
        Ok(count) => Some(count),
        Err(err) => {
            tracing::warn!(error = %err, "new alias count failed, omitting from metadata");
            None
        }
    };

    let rate = if total > 0 {
        remerged as f64 / total as f64
    } else {
        0.0
    };
    Ok(RemergeStats {
        rate,
        total,
        remerged,
        new_aliases,
    })
}

/// Compares `[start, end)` against the preceding window of equal length.
pub fn probe_edge_confidence_shift(
    store: &dyn DriftStore,
    start: i64,
    end: i64,
) -> Result<EdgeShiftStats, StoreError> {
    let span = end.saturating_sub(start);
    let current = store.edge_strength_stats(start, end)?;
    let previous = store.edge_strength_stats(start.saturating_sub(span), start)?;

    if current.count == 0 || previous.count == 0 {
        return Ok(EdgeShiftStats {
            shift: 0.0,
            samples: 0,
            current,
            previous,
        });
    }
    Ok(EdgeShiftStats {
        shift: (current.mean - previous.mean).abs(),
        samples: current.count + previous.count,
        current,
        previous,
    })
}

pub fn remerge_metric(
    outcome: Result<RemergeStats, StoreError>,
    config: &MonitorConfig,
) -> MetricResult {
    let thresholds = config.thresholds(MetricName::RemergeRate);
    match outcome {
        Ok(stats) => {
            let metric = build_rate_metric(MetricName::RemergeRate, stats.rate, thresholds, stats.total)
                .with_meta([("remerge_updates", json!(stats.remerged))]);
            match stats.new_aliases {
                Some(new_aliases) => metric.with_meta([("new_aliases", json!(new_aliases))]),
                None => metric,
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, metric = %MetricName::RemergeRate, "graph probe failed");
            insufficient_metric(MetricName::RemergeRate, thresholds, err.to_string())
        }
    }
}

pub fn edge_shift_metric(
    outcome: Result<EdgeShiftStats, StoreError>,
    config: &MonitorConfig,
) -> MetricResult {
    let thresholds = config.thresholds(MetricName::EdgeConfidenceShift);
    match outcome {
        Ok(stats) => build_rate_metric(
            MetricName::EdgeConfidenceShift,
            stats.shift,
            thresholds,
            stats.samples,
        )
        .with_meta([
            ("current_mean", json!(stats.current.mean)),
            ("current_count", json!(stats.current.count)),
            ("previous_mean", json!(stats.previous.mean)),
            ("previous_count", json!(stats.previous.count)),
            ("baseline_missing", json!(stats.previous.count == 0)),
            ("current_missing", json!(stats.current.count == 0)),
        ]),
        Err(err) => {
            tracing::warn!(
                error = %err,
                metric = %MetricName::EdgeConfidenceShift,
                "graph probe failed"
            );
            insufficient_metric(MetricName::EdgeConfidenceShift, thresholds, err.to_string())
        }
    }
}
