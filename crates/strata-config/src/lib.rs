use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_core::{Direction, MetricName};
use thiserror::Error;

pub const STRATA_DIR_NAME: &str = ".strata";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SQLITE_FILE_NAME: &str = "strata.sqlite";

pub const DEFAULT_WINDOW_HOURS: i64 = 168;
pub const DEFAULT_MIN_SAMPLES: i64 = 50;
pub const DEFAULT_MAX_SAMPLES: i64 = 5_000;
pub const DEFAULT_NEAR_THRESHOLD_MARGIN: f64 = 0.05;
pub const DEFAULT_RECOMMENDATION_COOLDOWN_HOURS: i64 = 24;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
/// Ten years. Keeps window bounds inside the range RFC3339 rendering supports.
pub const MAX_WINDOW_HOURS: i64 = 24 * 365 * 10;

pub const ENV_GRAPH_VERSION: &str = "STRATA_GRAPH_VERSION";
pub const ENV_WINDOW_HOURS: &str = "STRATA_WINDOW_HOURS";
pub const ENV_MAX_SAMPLES: &str = "STRATA_MAX_SAMPLES";
pub const ENV_ALERT_ON_WARN: &str = "STRATA_ALERT_ON_WARN";
pub const ENV_RECOMMENDATION_STATUS: &str = "STRATA_RECOMMENDATION_STATUS";
pub const ENV_DISABLED: &str = "STRATA_DISABLED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StrataConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_version: Option<String>,
    pub allow_fallback_graph_version: bool,
    pub window_hours: i64,
    pub min_samples: i64,
    pub max_samples: i64,
    pub near_threshold_margin: f64,
    pub score_margin_mean_warn_min: f64,
    pub score_margin_mean_crit_min: f64,
    pub score_margin_p10_warn_min: f64,
    pub score_margin_p10_crit_min: f64,
    pub near_threshold_rate_warn_max: f64,
    pub near_threshold_rate_crit_max: f64,
    pub remerge_rate_warn_max: f64,
    pub remerge_rate_crit_max: f64,
    pub edge_confidence_shift_warn_max: f64,
    pub edge_confidence_shift_crit_max: f64,
    pub alert_on_warn: bool,
    pub recommendation_status: String,
    pub recommendation_cooldown_hours: i64,
    pub decision_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            graph_version: None,
            allow_fallback_graph_version: false,
            window_hours: DEFAULT_WINDOW_HOURS,
            min_samples: DEFAULT_MIN_SAMPLES,
            max_samples: DEFAULT_MAX_SAMPLES,
            near_threshold_margin: DEFAULT_NEAR_THRESHOLD_MARGIN,
            score_margin_mean_warn_min: 0.1,
            score_margin_mean_crit_min: 0.05,
            score_margin_p10_warn_min: 0.05,
            score_margin_p10_crit_min: 0.02,
            near_threshold_rate_warn_max: 0.3,
            near_threshold_rate_crit_max: 0.5,
            remerge_rate_warn_max: 0.05,
            remerge_rate_crit_max: 0.1,
            edge_confidence_shift_warn_max: 0.1,
            edge_confidence_shift_crit_max: 0.2,
            alert_on_warn: false,
            recommendation_status: String::new(),
            recommendation_cooldown_hours: DEFAULT_RECOMMENDATION_COOLDOWN_HOURS,
            decision_types: Vec::new(),
            trace_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricThresholds {
    pub warn: f64,
    pub crit: f64,
    pub direction: Direction,
}

impl MonitorConfig {
    pub fn thresholds(&self, metric: MetricName) -> MetricThresholds {
        let (warn, crit) = match metric {
            MetricName::CandidateScoreMarginMean => (
                self.score_margin_mean_warn_min,
                self.score_margin_mean_crit_min,
            ),
            MetricName::CandidateScoreMarginP10 => (
                self.score_margin_p10_warn_min,
                self.score_margin_p10_crit_min,
            ),
            MetricName::MergeNearThresholdRate => (
                self.near_threshold_rate_warn_max,
                self.near_threshold_rate_crit_max,
            ),
            MetricName::RemergeRate => (self.remerge_rate_warn_max, self.remerge_rate_crit_max),
            MetricName::EdgeConfidenceShift => (
                self.edge_confidence_shift_warn_max,
                self.edge_confidence_shift_crit_max,
            ),
        };
        MetricThresholds {
            warn,
            crit,
            direction: metric.direction(),
        }
    }

    /// Replaces unset or non-positive sizing knobs with their defaults.
    pub fn resolved(mut self) -> Self {
        if self.window_hours <= 0 {
            self.window_hours = DEFAULT_WINDOW_HOURS;
        }
        if self.min_samples <= 0 {
            self.min_samples = DEFAULT_MIN_SAMPLES;
        }
        if self.max_samples <= 0 {
            self.max_samples = DEFAULT_MAX_SAMPLES;
        }
        if !self.near_threshold_margin.is_finite() || self.near_threshold_margin <= 0.0 {
            self.near_threshold_margin = DEFAULT_NEAR_THRESHOLD_MARGIN;
        }
        if self.recommendation_cooldown_hours <= 0 {
            self.recommendation_cooldown_hours = DEFAULT_RECOMMENDATION_COOLDOWN_HOURS;
        }
        self.graph_version = normalize_optional(self.graph_version.take());
        self.trace_id = normalize_optional(self.trace_id.take());
        self.recommendation_status = self.recommendation_status.trim().to_owned();
        self.decision_types = normalize_list(std::mem::take(&mut self.decision_types));
        self
    }

    /// Rejects values `resolved()` cannot repair, such as an oversized window.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        bounded_window_hours("window_hours", self.window_hours).map(|_| ())
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_GRAPH_VERSION) {
            self.graph_version = normalize_optional(Some(value));
        }
        if let Some(value) = lookup(ENV_WINDOW_HOURS) {
            self.window_hours = bounded_window_hours(
                ENV_WINDOW_HOURS,
                parse_i64_text(ENV_WINDOW_HOURS, value.as_str())?,
            )?;
        }
        if let Some(value) = lookup(ENV_MAX_SAMPLES) {
            self.max_samples = parse_i64_text(ENV_MAX_SAMPLES, value.as_str())?;
        }
        if let Some(value) = lookup(ENV_ALERT_ON_WARN) {
            self.alert_on_warn = parse_bool_text(ENV_ALERT_ON_WARN, value.as_str())?;
        }
        if let Some(value) = lookup(ENV_RECOMMENDATION_STATUS) {
            self.recommendation_status = value.trim().to_owned();
        }
        if let Some(value) = lookup(ENV_DISABLED) {
            self.disabled = parse_bool_text(ENV_DISABLED, value.as_str())?;
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Overlays job payload keys onto this config. Unknown keys are ignored.
    pub fn apply_payload(&mut self, payload: &Map<String, Value>) -> Result<(), ConfigError> {
        for (key, value) in payload {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "disabled" => self.disabled = payload_bool(key, value)?,
                "graph_version" => self.graph_version = Some(payload_string(key, value)?),
                "allow_fallback_graph_version" => {
                    self.allow_fallback_graph_version = payload_bool(key, value)?
                }
                "window_hours" => {
                    self.window_hours = bounded_window_hours(key, payload_i64(key, value)?)?
                }
                "min_samples" => self.min_samples = payload_i64(key, value)?,
                "max_samples" => self.max_samples = payload_i64(key, value)?,
                "near_threshold_margin" => self.near_threshold_margin = payload_f64(key, value)?,
                "score_margin_mean_warn_min" => {
                    self.score_margin_mean_warn_min = payload_f64(key, value)?
                }
                "score_margin_mean_crit_min" => {
                    self.score_margin_mean_crit_min = payload_f64(key, value)?
                }
                "score_margin_p10_warn_min" => {
                    self.score_margin_p10_warn_min = payload_f64(key, value)?
                }
                "score_margin_p10_crit_min" => {
                    self.score_margin_p10_crit_min = payload_f64(key, value)?
                }
                "near_threshold_rate_warn_max" => {
                    self.near_threshold_rate_warn_max = payload_f64(key, value)?
                }
                "near_threshold_rate_crit_max" => {
                    self.near_threshold_rate_crit_max = payload_f64(key, value)?
                }
                "remerge_rate_warn_max" => self.remerge_rate_warn_max = payload_f64(key, value)?,
                "remerge_rate_crit_max" => self.remerge_rate_crit_max = payload_f64(key, value)?,
                "edge_confidence_shift_warn_max" => {
                    self.edge_confidence_shift_warn_max = payload_f64(key, value)?
                }
                "edge_confidence_shift_crit_max" => {
                    self.edge_confidence_shift_crit_max = payload_f64(key, value)?
                }
                "alert_on_warn" => self.alert_on_warn = payload_bool(key, value)?,
                "recommendation_status" => {
                    self.recommendation_status = payload_string(key, value)?
                }
                "recommendation_cooldown_hours" => {
                    self.recommendation_cooldown_hours = payload_i64(key, value)?
                }
                "decision_types" => self.decision_types = payload_string_list(key, value)?,
                "trace_id" => self.trace_id = Some(payload_string(key, value)?),
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub log: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonl_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            log: true,
            jsonl_path: None,
            webhook_url: None,
            webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

pub fn strata_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(STRATA_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    strata_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn sqlite_path(workspace_root: impl AsRef<Path>, config: &StrataConfig) -> PathBuf {
    let workspace_root = workspace_root.as_ref();
    match config.storage.sqlite_path.as_deref() {
        Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
        Some(path) => workspace_root.join(path),
        None => strata_dir(workspace_root).join(SQLITE_FILE_NAME),
    }
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<StrataConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(StrataConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: StrataConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<StrataConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(strata_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = StrataConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &StrataConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let monitor = &config.monitor;

    for metric in MetricName::ALL {
        let thresholds = monitor.thresholds(metric);
        if thresholds.warn <= 0.0 || thresholds.crit <= 0.0 {
            continue;
        }
        let inverted = match thresholds.direction {
            Direction::Min => thresholds.crit > thresholds.warn,
            Direction::Max => thresholds.crit < thresholds.warn,
        };
        if inverted {
            warnings.push(ConfigWarning {
                code: "threshold_order",
                message: format!(
                    "{metric}: critical threshold {} is looser than warn threshold {} for direction '{}'",
                    thresholds.crit,
                    thresholds.warn,
                    thresholds.direction.as_str()
                ),
            });
        }
    }

    if monitor.min_samples > 0 && monitor.max_samples > 0 && monitor.min_samples > monitor.max_samples
    {
        warnings.push(ConfigWarning {
            code: "sample_bounds",
            message: format!(
                "min_samples ({}) exceeds max_samples ({})",
                monitor.min_samples, monitor.max_samples
            ),
        });
    }

    if let Some(url) = config.alerts.webhook_url.as_deref() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            warnings.push(ConfigWarning {
                code: "webhook_url",
                message: format!("alerts.webhook_url '{url}' is not an http(s) URL"),
            });
        }
    }

    warnings
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_list(input: Vec<String>) -> Vec<String> {
    input
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}

fn normalize_config(mut config: StrataConfig) -> StrataConfig {
    config.monitor.graph_version = normalize_optional(config.monitor.graph_version.take());
    config.monitor.trace_id = normalize_optional(config.monitor.trace_id.take());
    config.monitor.decision_types =
        normalize_list(std::mem::take(&mut config.monitor.decision_types));
    config.alerts.jsonl_path = normalize_optional(config.alerts.jsonl_path.take());
    config.alerts.webhook_url = normalize_optional(config.alerts.webhook_url.take());
    config.storage.sqlite_path = normalize_optional(config.storage.sqlite_path.take());
    if config.alerts.webhook_timeout_secs == 0 {
        config.alerts.webhook_timeout_secs = DEFAULT_WEBHOOK_TIMEOUT_SECS;
    }
    config
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_owned(),
        reason: reason.into(),
    }
}

fn bounded_window_hours(key: &str, hours: i64) -> Result<i64, ConfigError> {
    if hours > MAX_WINDOW_HOURS {
        return Err(invalid(
            key,
            format!("window of {hours} hours exceeds the maximum of {MAX_WINDOW_HOURS}"),
        ));
    }
    Ok(hours)
}

fn parse_i64_text(key: &str, raw: &str) -> Result<i64, ConfigError> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.trunc() as i64),
        _ => Err(invalid(key, format!("expected an integer, got '{raw}'"))),
    }
}

fn parse_bool_text(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got '{other}'"))),
    }
}

fn payload_i64(key: &str, value: &Value) -> Result<i64, ConfigError> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
            .ok_or_else(|| invalid(key, format!("expected an integer, got {number}"))),
        Value::String(text) => parse_i64_text(key, text),
        other => Err(invalid(key, format!("expected an integer, got {other}"))),
    }
}

fn payload_f64(key: &str, value: &Value) -> Result<f64, ConfigError> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| invalid(key, format!("expected a number, got {number}"))),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(key, format!("expected a number, got '{text}'"))),
        other => Err(invalid(key, format!("expected a number, got {other}"))),
    }
}

fn payload_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) => parse_bool_text(key, text),
        Value::Number(number) => Ok(number.as_f64().is_some_and(|v| v != 0.0)),
        other => Err(invalid(key, format!("expected a boolean, got {other}"))),
    }
}

fn payload_string(key: &str, value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::String(text) => Ok(text.trim().to_owned()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(invalid(key, format!("expected a string, got {other}"))),
    }
}

fn payload_string_list(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| payload_string(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(normalize_list),
        Value::String(text) => Ok(normalize_list(
            text.split(',').map(str::to_owned).collect::<Vec<_>>(),
        )),
        other => Err(invalid(
            key,
            format!("expected a list of strings, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("payload object")
    }

    #[test]
    fn ensure_workspace_config_creates_default_file() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();

        let config = ensure_workspace_config(workspace).expect("ensure config");

        assert_eq!(config.monitor.window_hours, DEFAULT_WINDOW_HOURS);
        assert!(config.alerts.log);
        assert!(config_path(workspace).exists());

        let content = fs::read_to_string(config_path(workspace)).expect("read config file");
        assert!(content.contains("[monitor]"));
        assert!(content.contains("window_hours = 168"));
    }

    #[test]
    fn load_workspace_config_parses_monitor_and_alert_values() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        fs::create_dir_all(strata_dir(workspace)).expect("create .strata");

        let raw = r#"
[monitor]
graph_version = "  v3  "
window_hours = 24
near_threshold_rate_warn_max = 0.25
decision_types = ["merge", " ", "link"]
recommendation_status = "recommended"

[alerts]
log = false
webhook_url = "https://alerts.example.com/hook"
"#;
        fs::write(config_path(workspace), raw).expect("write config");

        let config = load_workspace_config(workspace).expect("load config");

        assert_eq!(config.monitor.graph_version.as_deref(), Some("v3"));
        assert_eq!(config.monitor.window_hours, 24);
        assert_eq!(config.monitor.near_threshold_rate_warn_max, 0.25);
        assert_eq!(config.monitor.max_samples, DEFAULT_MAX_SAMPLES);
        assert_eq!(config.monitor.decision_types, vec!["merge", "link"]);
        assert!(!config.alerts.log);
        assert_eq!(
            config.alerts.webhook_url.as_deref(),
            Some("https://alerts.example.com/hook")
        );
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn resolved_replaces_non_positive_values_with_defaults() {
        let config = MonitorConfig {
            window_hours: 0,
            min_samples: -1,
            max_samples: 0,
            near_threshold_margin: 0.0,
            recommendation_cooldown_hours: -5,
            graph_version: Some("   ".to_owned()),
            ..MonitorConfig::default()
        }
        .resolved();

        assert_eq!(config.window_hours, 168);
        assert_eq!(config.min_samples, 50);
        assert_eq!(config.max_samples, 5_000);
        assert_eq!(config.near_threshold_margin, 0.05);
        assert_eq!(config.recommendation_cooldown_hours, 24);
        assert_eq!(config.graph_version, None);
    }

    #[test]
    fn payload_overrides_accept_mixed_encodings() {
        let mut config = MonitorConfig::default();
        config
            .apply_payload(&payload(json!({
                "graph_version": "v9",
                "window_hours": "48",
                "max_samples": 100.0,
                "near_threshold_margin": "0.02",
                "alert_on_warn": "true",
                "allow_fallback_graph_version": true,
                "decision_types": "merge, link",
                "recommendation_status": "recommended",
                "trace_id": "trace-1",
                "unknown_key": {"ignored": true},
                "remerge_rate_crit_max": null,
            })))
            .expect("apply payload");

        assert_eq!(config.graph_version.as_deref(), Some("v9"));
        assert_eq!(config.window_hours, 48);
        assert_eq!(config.max_samples, 100);
        assert_eq!(config.near_threshold_margin, 0.02);
        assert!(config.alert_on_warn);
        assert!(config.allow_fallback_graph_version);
        assert_eq!(config.decision_types, vec!["merge", "link"]);
        assert_eq!(config.recommendation_status, "recommended");
        assert_eq!(config.trace_id.as_deref(), Some("trace-1"));
        assert_eq!(config.remerge_rate_crit_max, 0.1);
    }

    #[test]
    fn payload_rejects_wrong_types() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_payload(&payload(json!({ "window_hours": [1, 2] })))
            .expect_err("array is not an integer");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "window_hours"));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_payload(&payload(json!({ "window_hours": 3_000_000_000_i64 })))
            .expect_err("window too large");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "window_hours"));
        assert_eq!(config.window_hours, DEFAULT_WINDOW_HOURS);

        let err = config
            .apply_env_overrides(|key| (key == ENV_WINDOW_HOURS).then(|| "9999999".to_owned()))
            .expect_err("env window too large");
        assert!(err.to_string().contains(ENV_WINDOW_HOURS));

        config.window_hours = MAX_WINDOW_HOURS;
        assert!(config.check_bounds().is_ok());
        config.window_hours = MAX_WINDOW_HOURS + 1;
        assert!(config.check_bounds().is_err());
    }

    #[test]
    fn env_overrides_use_lookup() {
        let env = HashMap::from([
            (ENV_GRAPH_VERSION, "v2"),
            (ENV_WINDOW_HOURS, "12"),
            (ENV_ALERT_ON_WARN, "yes"),
            (ENV_DISABLED, "0"),
        ]);
        let mut config = MonitorConfig::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|value| (*value).to_owned()))
            .expect("apply env");

        assert_eq!(config.graph_version.as_deref(), Some("v2"));
        assert_eq!(config.window_hours, 12);
        assert!(config.alert_on_warn);
        assert!(!config.disabled);

        let err = config
            .apply_env_overrides(|key| (key == ENV_MAX_SAMPLES).then(|| "lots".to_owned()))
            .expect_err("non numeric");
        assert!(err.to_string().contains(ENV_MAX_SAMPLES));
    }

    #[test]
    fn validate_config_flags_inverted_thresholds_and_bounds() {
        let mut config = StrataConfig::default();
        config.monitor.score_margin_mean_warn_min = 0.05;
        config.monitor.score_margin_mean_crit_min = 0.1;
        config.monitor.remerge_rate_warn_max = 0.5;
        config.monitor.remerge_rate_crit_max = 0.2;
        config.monitor.min_samples = 10_000;
        config.alerts.webhook_url = Some("ftp://nope".to_owned());

        let codes = validate_config(&config)
            .into_iter()
            .map(|warning| warning.code)
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec!["threshold_order", "threshold_order", "sample_bounds", "webhook_url"]
        );
    }

    #[test]
    fn thresholds_carry_metric_direction() {
        let config = MonitorConfig::default();
        let margin = config.thresholds(MetricName::CandidateScoreMarginP10);
        assert_eq!(margin.direction, Direction::Min);
        assert_eq!(margin.warn, 0.05);
        let shift = config.thresholds(MetricName::EdgeConfidenceShift);
        assert_eq!(shift.direction, Direction::Max);
        assert_eq!(shift.crit, 0.2);
    }

    #[test]
    fn sqlite_path_resolves_relative_to_workspace() {
        let mut config = StrataConfig::default();
        assert_eq!(
            sqlite_path("/work", &config),
            PathBuf::from("/work/.strata/strata.sqlite")
        );
        config.storage.sqlite_path = Some("data/drift.db".to_owned());
        assert_eq!(
            sqlite_path("/work", &config),
            PathBuf::from("/work/data/drift.db")
        );
    }
}
