use std::rc::Rc;

use serde_json::{Map, Value, json};
use strata_config::{ConfigError, MonitorConfig};
use strata_core::{DriftMetricRecord, hours_to_millis, rfc3339_from_millis};
use strata_observe::{AlertContext, AlertMetric, AlertSink};
use strata_store::{
    DriftStore, MetricsRepository, RollbackEventRepository, SqliteStore, StoreError, TraceQuery,
};
use thiserror::Error;
use uuid::Uuid;

use crate::evaluator::MetricResult;
use crate::graph_probes::{
    edge_shift_metric, probe_edge_confidence_shift, probe_remerge_rate, remerge_metric,
};
use crate::job::{Clock, JobRuntime, SystemClock};
use crate::recommender::{RecommendationOutcome, RecommendationRequest, recommend_rollback};
use crate::traces::{analyze_traces, trace_metrics};

pub const PHASE_DEPS: &str = "deps";
pub const PHASE_SAMPLE: &str = "sample";
pub const PHASE_ANALYZE: &str = "analyze";
pub const PHASE_PERSIST: &str = "persist";
pub const PHASE_ALERT: &str = "alert";
pub const PHASE_RECOMMEND: &str = "recommend";
pub const PHASE_COMPUTE: &str = "compute";
pub const PHASE_DONE: &str = "done";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),
    #[error("graph version unresolved: {0}")]
    GraphVersionUnresolved(String),
    #[error("drift monitor run cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Phase reported to the job runtime when a run fails.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::MissingDependency(_) | Self::GraphVersionUnresolved(_) => {
                PHASE_DEPS
            }
            Self::Store(_) | Self::Cancelled => PHASE_COMPUTE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriftRunSummary {
    pub graph_version: String,
    pub window_start: i64,
    pub window_end: i64,
    pub metrics: Vec<MetricResult>,
    pub metrics_written: usize,
    pub alerts: Vec<String>,
    pub recommendation_written: bool,
    pub rollback_event_id: Option<String>,
    pub trace_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    Disabled,
    Completed(DriftRunSummary),
}

impl MonitorOutcome {
    pub fn summary(&self) -> Option<&DriftRunSummary> {
        match self {
            Self::Disabled => None,
            Self::Completed(summary) => Some(summary),
        }
    }

    /// Job result mapping handed to [`JobRuntime::succeed`].
    pub fn to_value(&self) -> Value {
        let Self::Completed(summary) = self else {
            return json!({ "disabled": true });
        };

        let mut value = json!({
            "graph_version": summary.graph_version,
            "window_start": rfc3339_from_millis(summary.window_start),
            "window_end": rfc3339_from_millis(summary.window_end),
            "metrics_written": summary.metrics_written,
            "alerts": summary.alerts,
            "recommendation_written": summary.recommendation_written,
            "trace_id": summary.trace_id,
        });
        if let (Some(id), Some(map)) = (summary.rollback_event_id.as_ref(), value.as_object_mut()) {
            map.insert("rollback_event_id".to_owned(), Value::String(id.clone()));
        }
        value
    }
}

pub struct DriftMonitor {
    config: MonitorConfig,
    store: Option<Rc<dyn DriftStore>>,
    metrics: Option<Rc<dyn MetricsRepository>>,
    rollbacks: Option<Rc<dyn RollbackEventRepository>>,
    sink: Option<Rc<dyn AlertSink>>,
    clock: Rc<dyn Clock>,
}

impl DriftMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: None,
            metrics: None,
            rollbacks: None,
            sink: None,
            clock: Rc::new(SystemClock),
        }
    }

    /// Wires one SQLite handle as the query surface and both repositories.
    pub fn with_sqlite(self, store: Rc<SqliteStore>) -> Self {
        self.with_store(store.clone())
            .with_metrics_repository(store.clone())
            .with_rollback_repository(store)
    }

    pub fn with_store(mut self, store: Rc<dyn DriftStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metrics_repository(mut self, metrics: Rc<dyn MetricsRepository>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_rollback_repository(mut self, rollbacks: Rc<dyn RollbackEventRepository>) -> Self {
        self.rollbacks = Some(rollbacks);
        self
    }

    pub fn with_alert_sink(mut self, sink: Rc<dyn AlertSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Base config overlaid with the job payload.
    pub fn effective_config(
        &self,
        payload: &Map<String, Value>,
    ) -> Result<MonitorConfig, AnalysisError> {
        let mut config = self.config.clone();
        config.apply_payload(payload)?;
        Ok(config)
    }

    pub fn run_job(&self, job: &dyn JobRuntime) -> Result<MonitorOutcome, AnalysisError> {
        let result = self
            .effective_config(&job.payload())
            .and_then(|config| self.run(&config, job));
        match &result {
            Ok(outcome) => job.succeed(PHASE_DONE, &outcome.to_value()),
            Err(err) => job.fail(err.phase(), err),
        }
        result
    }

    pub fn run(
        &self,
        config: &MonitorConfig,
        job: &dyn JobRuntime,
    ) -> Result<MonitorOutcome, AnalysisError> {
        let config = config.clone().resolved();
        if config.disabled {
            tracing::info!("structural drift monitor disabled, skipping run");
            return Ok(MonitorOutcome::Disabled);
        }
        let cancel = job.cancellation();

        job.progress(PHASE_DEPS, 5, "validating dependencies");
        config.check_bounds()?;
        let store = self
            .store
            .as_deref()
            .ok_or(AnalysisError::MissingDependency("drift store"))?;
        let metrics_repository = self
            .metrics
            .as_deref()
            .ok_or(AnalysisError::MissingDependency("metrics repository"))?;

        cancel.check()?;
        let graph_version = resolve_graph_version(store, &config)?;
        let trace_id = config
            .trace_id
            .clone()
            .or_else(|| job.trace_id().filter(|value| !value.trim().is_empty()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let window_end = self.clock.now_millis();
        let window_start = window_end - hours_to_millis(config.window_hours);
        tracing::info!(
            graph_version = %graph_version,
            trace_id = %trace_id,
            window_hours = config.window_hours,
            "structural drift run started"
        );

        job.progress(PHASE_SAMPLE, 20, "loading decision traces");
        cancel.check()?;
        let traces = store.list_decision_traces(&TraceQuery {
            graph_version: graph_version.clone(),
            window_start,
            window_end,
            decision_types: config.decision_types.clone(),
            limit: u32::try_from(config.max_samples).unwrap_or(u32::MAX),
        })?;

        job.progress(PHASE_ANALYZE, 40, "computing drift metrics");
        let stats = analyze_traces(&traces, config.near_threshold_margin);
        let mut metrics = trace_metrics(&stats, &config);
        cancel.check()?;
        metrics.push(remerge_metric(
            probe_remerge_rate(store, window_start, window_end),
            &config,
        ));
        cancel.check()?;
        metrics.push(edge_shift_metric(
            probe_edge_confidence_shift(store, window_start, window_end),
            &config,
        ));
        let metrics = metrics
            .into_iter()
            .map(|metric| annotate(metric, trace_id.as_str(), config.min_samples))
            .collect::<Vec<_>>();
        for metric in &metrics {
            tracing::debug!(
                metric = %metric.name,
                value = metric.value,
                samples = metric.samples,
                status = %metric.status,
                "drift metric computed"
            );
        }

        job.progress(PHASE_PERSIST, 60, "persisting drift metrics");
        cancel.check()?;
        let rows = metrics
            .iter()
            .map(|metric| metric_record(metric, graph_version.as_str(), window_start, window_end))
            .collect::<Vec<_>>();
        let stored = metrics_repository.create_many(&rows)?;

        let alerts = metrics
            .iter()
            .filter(|metric| metric.is_alerting(config.alert_on_warn))
            .cloned()
            .collect::<Vec<_>>();
        if !alerts.is_empty() {
            job.progress(PHASE_ALERT, 75, "reporting structural drift alerts");
            cancel.check()?;
            let context = AlertContext {
                graph_version: graph_version.clone(),
                window_start: rfc3339_from_millis(window_start),
                window_end: rfc3339_from_millis(window_end),
                trace_id: trace_id.clone(),
            };
            self.report_alerts(&alerts, &context);
        }

        let mut recommendation = None;
        if !alerts.is_empty() && !config.recommendation_status.is_empty() {
            job.progress(PHASE_RECOMMEND, 90, "evaluating rollback recommendation");
            cancel.check()?;
            recommendation = self.recommend(
                store,
                &RecommendationRequest {
                    graph_version: graph_version.as_str(),
                    status: config.recommendation_status.as_str(),
                    cooldown_hours: config.recommendation_cooldown_hours,
                    now: window_end,
                    trace_id: trace_id.as_str(),
                    alerts: &alerts,
                },
            );
        }

        let summary = DriftRunSummary {
            graph_version,
            window_start,
            window_end,
            metrics_written: stored.len(),
            alerts: alerts
                .iter()
                .map(|metric| metric.name.as_str().to_owned())
                .collect(),
            recommendation_written: recommendation
                .as_ref()
                .is_some_and(RecommendationOutcome::written),
            rollback_event_id: recommendation
                .as_ref()
                .and_then(RecommendationOutcome::rollback_event_id)
                .map(str::to_owned),
            trace_id,
            metrics,
        };
        tracing::info!(
            graph_version = %summary.graph_version,
            trace_id = %summary.trace_id,
            metrics_written = summary.metrics_written,
            alerts = summary.alerts.len(),
            recommendation_written = summary.recommendation_written,
            "structural drift run finished"
        );
        Ok(MonitorOutcome::Completed(summary))
    }

    fn report_alerts(&self, alerts: &[MetricResult], context: &AlertContext) {
        let Some(sink) = self.sink.as_deref() else {
            tracing::debug!(alerts = alerts.len(), "no alert sink configured");
            return;
        };
        let payload = alerts
            .iter()
            .map(|metric| AlertMetric {
                name: metric.name.as_str().to_owned(),
                status: metric.status,
                value: metric.value,
                threshold: metric.warn,
                meta: Value::Object(metric.metadata.clone()),
            })
            .collect::<Vec<_>>();
        if let Err(err) = sink.report_structural_drift(&payload, context) {
            tracing::warn!(
                error = %err,
                graph_version = %context.graph_version,
                trace_id = %context.trace_id,
                "structural drift alert delivery failed"
            );
        }
    }

    fn recommend(
        &self,
        store: &dyn DriftStore,
        request: &RecommendationRequest<'_>,
    ) -> Option<RecommendationOutcome> {
        let Some(rollbacks) = self.rollbacks.as_deref() else {
            tracing::warn!(
                graph_version = %request.graph_version,
                "rollback recommendation requested without a rollback repository"
            );
            return None;
        };

        let outcome = recommend_rollback(store, rollbacks, request);
        match &outcome {
            RecommendationOutcome::Written { rollback_event_id } => tracing::info!(
                graph_version = %request.graph_version,
                rollback_event_id = %rollback_event_id,
                "rollback recommendation recorded"
            ),
            RecommendationOutcome::SkippedCooldown { recent_events } => tracing::info!(
                graph_version = %request.graph_version,
                recent_events,
                cooldown_hours = request.cooldown_hours,
                "rollback recommendation skipped, cooldown active"
            ),
            RecommendationOutcome::Failed { error } => tracing::warn!(
                graph_version = %request.graph_version,
                error = %error,
                "rollback recommendation failed"
            ),
        }
        Some(outcome)
    }
}

fn resolve_graph_version(
    store: &dyn DriftStore,
    config: &MonitorConfig,
) -> Result<String, AnalysisError> {
    if let Some(graph_version) = config.graph_version.as_deref() {
        return Ok(graph_version.to_owned());
    }
    if !config.allow_fallback_graph_version {
        return Err(AnalysisError::GraphVersionUnresolved(
            "graph_version is empty and fallback is disabled".to_owned(),
        ));
    }
    if let Some(active) = store.latest_graph_version(true)? {
        return Ok(active);
    }
    store.latest_graph_version(false)?.ok_or_else(|| {
        AnalysisError::GraphVersionUnresolved("no graph versions recorded".to_owned())
    })
}

fn annotate(metric: MetricResult, trace_id: &str, min_samples: i64) -> MetricResult {
    let samples = metric.samples;
    let warn = metric.warn;
    let crit = metric.crit;
    let metric = metric.with_meta([
        ("samples", json!(samples)),
        ("trace_id", json!(trace_id)),
        ("warn_threshold", json!(warn)),
        ("min_samples", json!(min_samples)),
    ]);
    if crit > 0.0 {
        metric.with_meta([("crit_threshold", json!(crit))])
    } else {
        metric
    }
}

fn metric_record(
    metric: &MetricResult,
    graph_version: &str,
    window_start: i64,
    window_end: i64,
) -> DriftMetricRecord {
    DriftMetricRecord {
        graph_version: graph_version.to_owned(),
        metric_name: metric.name.as_str().to_owned(),
        window_start,
        window_end,
        value: metric.value,
        threshold: metric.warn,
        status: metric.status,
        metadata: Value::Object(metric.metadata.clone()),
    }
}
