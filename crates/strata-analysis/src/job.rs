use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::AnalysisError;

pub trait Clock {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }
}

/// Callbacks a scheduler exposes to a running job.
pub trait JobRuntime {
    fn payload(&self) -> Map<String, Value>;
    fn progress(&self, phase: &str, pct: u8, message: &str);
    fn succeed(&self, phase: &str, summary: &Value);
    fn fail(&self, phase: &str, error: &AnalysisError);
    fn cancellation(&self) -> &CancellationToken;
    fn trace_id(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress {
        phase: String,
        pct: u8,
        message: String,
    },
    Succeeded {
        phase: String,
        summary: Value,
    },
    Failed {
        phase: String,
        error: String,
    },
}

/// In-process runtime that logs callbacks and keeps them for inspection.
#[derive(Debug, Default)]
pub struct LocalJob {
    payload: Map<String, Value>,
    trace_id: Option<String>,
    cancellation: CancellationToken,
    events: RefCell<Vec<JobEvent>>,
}

impl LocalJob {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.borrow().clone()
    }

    pub fn result(&self) -> Option<Value> {
        self.events.borrow().iter().rev().find_map(|event| match event {
            JobEvent::Succeeded { summary, .. } => Some(summary.clone()),
            JobEvent::Progress { .. } | JobEvent::Failed { .. } => None,
        })
    }

    pub fn failure(&self) -> Option<(String, String)> {
        self.events.borrow().iter().rev().find_map(|event| match event {
            JobEvent::Failed { phase, error } => Some((phase.clone(), error.clone())),
            JobEvent::Progress { .. } | JobEvent::Succeeded { .. } => None,
        })
    }
}

impl JobRuntime for LocalJob {
    fn payload(&self) -> Map<String, Value> {
        self.payload.clone()
    }

    fn progress(&self, phase: &str, pct: u8, message: &str) {
        tracing::debug!(phase, pct, "{message}");
        self.events.borrow_mut().push(JobEvent::Progress {
            phase: phase.to_owned(),
            pct,
            message: message.to_owned(),
        });
    }

    fn succeed(&self, phase: &str, summary: &Value) {
        tracing::info!(phase, "drift monitor job succeeded");
        self.events.borrow_mut().push(JobEvent::Succeeded {
            phase: phase.to_owned(),
            summary: summary.clone(),
        });
    }

    fn fail(&self, phase: &str, error: &AnalysisError) {
        tracing::error!(phase, error = %error, "drift monitor job failed");
        self.events.borrow_mut().push(JobEvent::Failed {
            phase: phase.to_owned(),
            error: error.to_string(),
        });
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn trace_id(&self) -> Option<String> {
        self.trace_id.clone()
    }
}
