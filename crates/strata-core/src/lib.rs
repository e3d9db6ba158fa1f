use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GLOBAL_SCOPE: &str = "global";
pub const ROLLBACK_TRIGGER_STRUCTURAL_DRIFT: &str = "structural_drift";
pub const GRAPH_VERSION_STATUS_ACTIVE: &str = "active";

pub const MILLIS_PER_HOUR: i64 = 60 * 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CandidateScoreMarginMean,
    CandidateScoreMarginP10,
    MergeNearThresholdRate,
    RemergeRate,
    EdgeConfidenceShift,
}

impl MetricName {
    pub const ALL: [MetricName; 5] = [
        Self::CandidateScoreMarginMean,
        Self::CandidateScoreMarginP10,
        Self::MergeNearThresholdRate,
        Self::RemergeRate,
        Self::EdgeConfidenceShift,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CandidateScoreMarginMean => "candidate_score_margin_mean",
            Self::CandidateScoreMarginP10 => "candidate_score_margin_p10",
            Self::MergeNearThresholdRate => "merge_near_threshold_rate",
            Self::RemergeRate => "remerge_rate",
            Self::EdgeConfidenceShift => "edge_confidence_shift",
        }
    }

    /// Lower margins mean more borderline decisions, so both margin metrics alarm downwards.
    pub fn direction(self) -> Direction {
        match self {
            Self::CandidateScoreMarginMean | Self::CandidateScoreMarginP10 => Direction::Min,
            Self::MergeNearThresholdRate | Self::RemergeRate | Self::EdgeConfidenceShift => {
                Direction::Max
            }
        }
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| format!("unknown drift metric '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Lower values are worse.
    Min,
    /// Higher values are worse.
    Max,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(format!(
                "invalid direction '{other}', expected one of: min, max"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    #[default]
    Ok,
    Warn,
    Critical,
    Insufficient,
}

impl MetricStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Critical => "critical",
            Self::Insufficient => "insufficient",
        }
    }
}

impl std::fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "ok" => Ok(Self::Ok),
            "warn" => Ok(Self::Warn),
            "critical" => Ok(Self::Critical),
            "insufficient" => Ok(Self::Insufficient),
            other => Err(format!(
                "invalid metric status '{other}', expected one of: ok, warn, critical, insufficient"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub id: String,
    pub occurred_at: i64,
    pub graph_version: String,
    pub decision_type: String,
    pub candidates: Value,
    pub chosen: Value,
    pub thresholds: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub scope: String,
    pub canonical_concept_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub id: String,
    pub source_concept_id: String,
    pub target_concept_id: String,
    pub strength: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphVersionRecord {
    pub graph_version: String,
    pub status: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetricRecord {
    pub graph_version: String,
    pub metric_name: String,
    pub window_start: i64,
    pub window_end: i64,
    pub value: f64,
    pub threshold: f64,
    pub status: MetricStatus,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDriftMetric {
    pub id: i64,
    pub created_at: i64,
    pub record: DriftMetricRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRollbackEvent {
    pub id: String,
    pub graph_version_from: String,
    pub trigger: String,
    pub status: String,
    pub notes: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackEventRecord {
    pub id: String,
    pub graph_version_from: String,
    pub trigger: String,
    pub status: String,
    pub notes: Value,
    pub created_at: i64,
}

pub fn datetime_from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn rfc3339_from_millis(millis: i64) -> String {
    datetime_from_millis(millis).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn hours_to_millis(hours: i64) -> i64 {
    hours.saturating_mul(MILLIS_PER_HOUR)
}
