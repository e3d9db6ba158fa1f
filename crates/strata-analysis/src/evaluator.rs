use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_config::MetricThresholds;
use strata_core::{Direction, MetricName, MetricStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: MetricName,
    pub value: f64,
    pub warn: f64,
    pub crit: f64,
    pub direction: Direction,
    pub samples: i64,
    pub status: MetricStatus,
    pub metadata: Map<String, Value>,
}

impl MetricResult {
    /// Merges `entries` into the metadata; later keys overwrite earlier ones.
    pub fn with_meta<I, K>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in entries {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    pub fn is_alerting(&self, alert_on_warn: bool) -> bool {
        match self.status {
            MetricStatus::Critical => true,
            MetricStatus::Warn => alert_on_warn,
            MetricStatus::Ok | MetricStatus::Insufficient => false,
        }
    }
}

/// Status for a metric value. Non-positive thresholds are disabled.
pub fn classify(value: f64, warn: f64, crit: f64, direction: Direction, samples: i64) -> MetricStatus {
    if samples <= 0 {
        return MetricStatus::Insufficient;
    }
    match direction {
        Direction::Min => {
            if crit > 0.0 && value <= crit {
                MetricStatus::Critical
            } else if warn > 0.0 && value <= warn {
                MetricStatus::Warn
            } else {
                MetricStatus::Ok
            }
        }
        Direction::Max => {
            if crit > 0.0 && value >= crit {
                MetricStatus::Critical
            } else if warn > 0.0 && value >= warn {
                MetricStatus::Warn
            } else {
                MetricStatus::Ok
            }
        }
    }
}

pub fn build_rate_metric(
    name: MetricName,
    value: f64,
    thresholds: MetricThresholds,
    samples: i64,
) -> MetricResult {
    let mut metadata = Map::new();
    let (value, samples) = if value.is_finite() {
        (value, samples.max(0))
    } else {
        metadata.insert("non_finite_value".to_owned(), Value::Bool(true));
        (0.0, 0)
    };

    MetricResult {
        name,
        value,
        warn: thresholds.warn,
        crit: thresholds.crit,
        direction: thresholds.direction,
        samples,
        status: classify(value, thresholds.warn, thresholds.crit, thresholds.direction, samples),
        metadata,
    }
}

/// Metric row for a probe that could not produce a value.
pub fn insufficient_metric(
    name: MetricName,
    thresholds: MetricThresholds,
    reason: impl Into<String>,
) -> MetricResult {
    build_rate_metric(name, 0.0, thresholds, 0)
        .with_meta([("probe_error", Value::String(reason.into()))])
}
