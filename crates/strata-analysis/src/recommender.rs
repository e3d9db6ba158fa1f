use serde_json::{Value, json};
use strata_core::{NewRollbackEvent, ROLLBACK_TRIGGER_STRUCTURAL_DRIFT, hours_to_millis};
use strata_store::{DriftStore, RollbackEventRepository, StoreError};
use uuid::Uuid;

use crate::evaluator::MetricResult;

#[derive(Debug, Clone)]
pub struct RecommendationRequest<'a> {
    pub graph_version: &'a str,
    pub status: &'a str,
    pub cooldown_hours: i64,
    pub now: i64,
    pub trace_id: &'a str,
    pub alerts: &'a [MetricResult],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendationOutcome {
    Written { rollback_event_id: String },
    SkippedCooldown { recent_events: i64 },
    Failed { error: String },
}

impl RecommendationOutcome {
    pub fn written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    pub fn rollback_event_id(&self) -> Option<&str> {
        match self {
            Self::Written { rollback_event_id } => Some(rollback_event_id.as_str()),
            Self::SkippedCooldown { .. } | Self::Failed { .. } => None,
        }
    }
}

pub fn recommendation_notes(alerts: &[MetricResult], trace_id: &str) -> Value {
    let metrics = alerts
        .iter()
        .map(|metric| {
            json!({
                "name": metric.name.as_str(),
                "status": metric.status.as_str(),
                "value": metric.value,
                "warn": metric.warn,
                "crit": metric.crit,
                "samples": metric.samples,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "metrics": metrics,
        "trace_id": trace_id,
    })
}

/// Records a rollback recommendation unless one for the same graph version exists inside the
/// cooldown. Two overlapping runs can both pass the cooldown check; consumers de-duplicate.
pub fn recommend_rollback(
    store: &dyn DriftStore,
    rollbacks: &dyn RollbackEventRepository,
    request: &RecommendationRequest<'_>,
) -> RecommendationOutcome {
    let cutoff = request
        .now
        .saturating_sub(hours_to_millis(request.cooldown_hours));
    let recent_events = match store.count_rollback_events_since(
        request.graph_version,
        ROLLBACK_TRIGGER_STRUCTURAL_DRIFT,
        cutoff,
    ) {
        Ok(count) => count,
        Err(err) => return failed(err),
    };
    if recent_events > 0 {
        return RecommendationOutcome::SkippedCooldown { recent_events };
    }

    let event = NewRollbackEvent {
        id: Uuid::new_v4().to_string(),
        graph_version_from: request.graph_version.to_owned(),
        trigger: ROLLBACK_TRIGGER_STRUCTURAL_DRIFT.to_owned(),
        status: request.status.to_owned(),
        notes: recommendation_notes(request.alerts, request.trace_id),
    };
    match rollbacks.create(&event) {
        Ok(()) => RecommendationOutcome::Written {
            rollback_event_id: event.id,
        },
        Err(err) => failed(err),
    }
}

fn failed(err: StoreError) -> RecommendationOutcome {
    RecommendationOutcome::Failed {
        error: err.to_string(),
    }
}
