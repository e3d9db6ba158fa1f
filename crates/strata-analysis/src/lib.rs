mod evaluator;
mod graph_probes;
mod job;
mod monitor;
mod probe;
mod recommender;
mod stats;
mod traces;

pub use evaluator::{MetricResult, build_rate_metric, classify, insufficient_metric};
pub use graph_probes::{
    EdgeShiftStats, RemergeStats, edge_shift_metric, probe_edge_confidence_shift,
    probe_remerge_rate, remerge_metric,
};
pub use job::{CancellationToken, Clock, FixedClock, JobEvent, JobRuntime, LocalJob, SystemClock};
pub use monitor::{
    AnalysisError, DriftMonitor, DriftRunSummary, MonitorOutcome, PHASE_ALERT, PHASE_ANALYZE,
    PHASE_COMPUTE, PHASE_DEPS, PHASE_DONE, PHASE_PERSIST, PHASE_RECOMMEND, PHASE_SAMPLE,
};
pub use probe::{
    CONTAINER_KEYS, MAX_PROBE_DEPTH, SCORE_KEYS, THRESHOLD_KEY_FRAGMENTS, coerce_f64,
    extract_candidate_scores, extract_chosen_score, extract_threshold,
};
pub use recommender::{
    RecommendationOutcome, RecommendationRequest, recommend_rollback, recommendation_notes,
};
pub use stats::{is_nan_or_inf, mean, quantile};
pub use traces::{TraceStats, analyze_traces, trace_metrics};
