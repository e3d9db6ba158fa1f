use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use strata_config::AlertsConfig;

use crate::{AlertContext, AlertMetric, AlertSink, SinkError};

pub const STRUCTURAL_DRIFT_EVENT: &str = "structural_drift";

pub fn structural_drift_event(alerts: &[AlertMetric], context: &AlertContext) -> Value {
    json!({
        "event": STRUCTURAL_DRIFT_EVENT,
        "reported_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "graph_version": context.graph_version,
        "window_start": context.window_start,
        "window_end": context.window_end,
        "trace_id": context.trace_id,
        "alerts": alerts,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn report_structural_drift(
        &self,
        alerts: &[AlertMetric],
        context: &AlertContext,
    ) -> Result<(), SinkError> {
        for alert in alerts {
            tracing::warn!(
                graph_version = %context.graph_version,
                trace_id = %context.trace_id,
                window_start = %context.window_start,
                window_end = %context.window_end,
                metric = %alert.name,
                status = %alert.status,
                value = alert.value,
                threshold = alert.threshold,
                "structural drift alert"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JsonlAlertSink {
    path: PathBuf,
}

impl JsonlAlertSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSink for JsonlAlertSink {
    fn report_structural_drift(
        &self,
        alerts: &[AlertMetric],
        context: &AlertContext,
    ) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&structural_drift_event(alerts, context))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    url: String,
    agent: ureq::Agent,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            url: url.into(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl AlertSink for WebhookAlertSink {
    fn report_structural_drift(
        &self,
        alerts: &[AlertMetric],
        context: &AlertContext,
    ) -> Result<(), SinkError> {
        let body = serde_json::to_string(&structural_drift_event(alerts, context))?;
        self.agent
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .send(body.as_str())?;
        Ok(())
    }
}

#[derive(Default)]
pub struct FanoutAlertSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for FanoutAlertSink {
    /// Every sink is attempted even after one fails.
    fn report_structural_drift(
        &self,
        alerts: &[AlertMetric],
        context: &AlertContext,
    ) -> Result<(), SinkError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(err) = sink.report_structural_drift(alerts, context) {
                failures.push(err.to_string());
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        Err(SinkError::Partial {
            failed: failures.len(),
            total: self.sinks.len(),
            message: failures.join("; "),
        })
    }
}

pub fn alert_sink_from_config(
    workspace_root: impl AsRef<Path>,
    config: &AlertsConfig,
) -> FanoutAlertSink {
    let mut fanout = FanoutAlertSink::new();
    if config.log {
        fanout = fanout.with_sink(TracingAlertSink);
    }
    if let Some(path) = config.jsonl_path.as_deref() {
        let path = Path::new(path);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            workspace_root.as_ref().join(path)
        };
        fanout = fanout.with_sink(JsonlAlertSink::new(path));
    }
    if let Some(url) = config.webhook_url.as_deref() {
        fanout = fanout.with_sink(WebhookAlertSink::new(
            url,
            Duration::from_secs(config.webhook_timeout_secs.max(1)),
        ));
    }
    fanout
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use strata_core::MetricStatus;
    use tempfile::tempdir;

    use super::*;

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn report_structural_drift(
            &self,
            _alerts: &[AlertMetric],
            _context: &AlertContext,
        ) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("pipe closed")))
        }
    }

    fn alert() -> AlertMetric {
        AlertMetric {
            name: "merge_near_threshold_rate".to_owned(),
            status: MetricStatus::Critical,
            value: 0.9,
            threshold: 0.3,
            meta: json!({"accept_count": 10, "near_count": 9}),
        }
    }

    fn context() -> AlertContext {
        AlertContext {
            graph_version: "v1".to_owned(),
            window_start: "2026-10-17T00:00:00.000Z".to_owned(),
            window_end: "2026-10-18T00:00:00.000Z".to_owned(),
            trace_id: "trace-1".to_owned(),
        }
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_report() {
        let temp = tempdir().expect("tempdir");
        let sink = JsonlAlertSink::new(temp.path().join("alerts/drift.jsonl"));

        sink.report_structural_drift(&[alert()], &context())
            .expect("first report");
        sink.report_structural_drift(&[alert()], &context())
            .expect("second report");

        let content = fs::read_to_string(sink.path()).expect("read alerts");
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let event: Value = serde_json::from_str(lines[0]).expect("parse line");
        assert_eq!(event["event"], "structural_drift");
        assert_eq!(event["graph_version"], "v1");
        assert_eq!(event["alerts"][0]["name"], "merge_near_threshold_rate");
        assert_eq!(event["alerts"][0]["status"], "critical");
    }

    #[test]
    fn fanout_attempts_every_sink_and_reports_failures() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("drift.jsonl");
        let fanout = FanoutAlertSink::new()
            .with_sink(FailingSink)
            .with_sink(JsonlAlertSink::new(&path));

        let err = fanout
            .report_structural_drift(&[alert()], &context())
            .expect_err("one sink fails");
        assert!(matches!(err, SinkError::Partial { failed: 1, total: 2, .. }));
        assert!(path.exists());
    }

    #[test]
    fn config_builds_requested_sinks() {
        let temp = tempdir().expect("tempdir");
        let config = AlertsConfig {
            log: true,
            jsonl_path: Some("alerts.jsonl".to_owned()),
            webhook_url: Some("http://127.0.0.1:9/hook".to_owned()),
            webhook_timeout_secs: 1,
        };
        let fanout = alert_sink_from_config(temp.path(), &config);
        assert_eq!(fanout.len(), 3);

        let quiet = alert_sink_from_config(
            temp.path(),
            &AlertsConfig {
                log: false,
                ..AlertsConfig::default()
            },
        );
        assert!(quiet.is_empty());
        assert!(quiet.report_structural_drift(&[alert()], &context()).is_ok());
    }
}
