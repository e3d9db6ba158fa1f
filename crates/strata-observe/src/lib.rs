mod logging;
mod sinks;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::MetricStatus;
use thiserror::Error;

pub use logging::{LogFormat, init_tracing};
pub use sinks::{
    FanoutAlertSink, JsonlAlertSink, TracingAlertSink, WebhookAlertSink, alert_sink_from_config,
    structural_drift_event,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMetric {
    pub name: String,
    pub status: MetricStatus,
    pub value: f64,
    pub threshold: f64,
    pub meta: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    pub graph_version: String,
    pub window_start: String,
    pub window_end: String,
    pub trace_id: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] ureq::Error),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("{failed} of {total} alert sinks failed: {message}")]
    Partial {
        failed: usize,
        total: usize,
        message: String,
    },
}

/// Destination for structural drift alerts. Callers treat every failure as best-effort.
pub trait AlertSink {
    fn report_structural_drift(
        &self,
        alerts: &[AlertMetric],
        context: &AlertContext,
    ) -> Result<(), SinkError>;
}

impl<T: AlertSink + ?Sized> AlertSink for Box<T> {
    fn report_structural_drift(
        &self,
        alerts: &[AlertMetric],
        context: &AlertContext,
    ) -> Result<(), SinkError> {
        (**self).report_structural_drift(alerts, context)
    }
}
