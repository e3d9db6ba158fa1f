use serde_json::json;
use strata_config::{DEFAULT_NEAR_THRESHOLD_MARGIN, MonitorConfig};
use strata_core::{DecisionTrace, MetricName};

use crate::evaluator::{MetricResult, build_rate_metric};
use crate::probe::{extract_candidate_scores, extract_chosen_score, extract_threshold};
use crate::stats::{mean, quantile};

const MARGIN_QUANTILE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraceStats {
    /// Ascending.
    pub margins: Vec<f64>,
    pub margin_samples: i64,
    pub accept_count: i64,
    pub near_count: i64,
    pub near_threshold_rate: f64,
}

pub fn analyze_traces(traces: &[DecisionTrace], near_threshold_margin: f64) -> TraceStats {
    let near_threshold_margin = if near_threshold_margin.is_finite() && near_threshold_margin > 0.0
    {
        near_threshold_margin
    } else {
        DEFAULT_NEAR_THRESHOLD_MARGIN
    };

    let mut stats = TraceStats::default();
    for trace in traces {
        let mut scores = extract_candidate_scores(&trace.candidates);
        scores.sort_by(|left, right| right.total_cmp(left));

        if let [first, second, ..] = scores.as_slice() {
            let margin = first - second;
            if margin.is_finite() {
                stats.margins.push(margin);
                stats.margin_samples += 1;
            }
        }

        let top_score = scores
            .first()
            .copied()
            .unwrap_or_else(|| extract_chosen_score(&trace.chosen));
        let Some(threshold) = extract_threshold(&trace.thresholds) else {
            continue;
        };
        // A zero top score means "not found".
        let usable = threshold.is_finite()
            && threshold > 0.0
            && top_score.is_finite()
            && top_score > 0.0;
        if !usable {
            continue;
        }

        if top_score >= threshold {
            stats.accept_count += 1;
            if top_score - threshold <= near_threshold_margin {
                stats.near_count += 1;
            }
        }
    }

    stats.margins.sort_by(f64::total_cmp);
    if stats.accept_count > 0 {
        stats.near_threshold_rate = stats.near_count as f64 / stats.accept_count as f64;
    }
    stats
}

/// Margin mean, margin p10 and near-threshold rate, in that order.
pub fn trace_metrics(stats: &TraceStats, config: &MonitorConfig) -> Vec<MetricResult> {
    let margin_mean = mean(&stats.margins);
    let margin_p10 = quantile(&stats.margins, MARGIN_QUANTILE);

    vec![
        build_rate_metric(
            MetricName::CandidateScoreMarginMean,
            margin_mean,
            config.thresholds(MetricName::CandidateScoreMarginMean),
            stats.margin_samples,
        )
        .with_meta([("p10", json!(margin_p10))]),
        build_rate_metric(
            MetricName::CandidateScoreMarginP10,
            margin_p10,
            config.thresholds(MetricName::CandidateScoreMarginP10),
            stats.margin_samples,
        )
        .with_meta([("mean", json!(margin_mean))]),
        build_rate_metric(
            MetricName::MergeNearThresholdRate,
            stats.near_threshold_rate,
            config.thresholds(MetricName::MergeNearThresholdRate),
            stats.accept_count,
        )
        .with_meta([
            ("accept_count", json!(stats.accept_count)),
            ("near_count", json!(stats.near_count)),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use strata_core::MetricStatus;

    use super::*;

    fn trace(id: &str, candidates: Value, chosen: Value, thresholds: Value) -> DecisionTrace {
        DecisionTrace {
            id: id.to_owned(),
            occurred_at: 0,
            graph_version: "v1".to_owned(),
            decision_type: "merge".to_owned(),
            candidates,
            chosen,
            thresholds,
        }
    }

    fn happy_path_traces() -> Vec<DecisionTrace> {
        vec![
            trace(
                "t-1",
                json!([{"score": 0.9}, {"score": 0.7}, {"score": 0.5}]),
                json!({"score": 0.9}),
                json!({"merge_threshold": 0.6}),
            ),
            trace(
                "t-2",
                json!({"candidates": [{"similarity": 0.80}, {"similarity": 0.82}]}),
                json!({"similarity": 0.82}),
                json!({"merge_threshold": 0.79}),
            ),
            trace(
                "t-3",
                json!([0.6, 0.4]),
                json!(0.6),
                json!({"min_score": "0.5"}),
            ),
        ]
    }

    #[test]
    fn margins_and_near_threshold_counts() {
        let stats = analyze_traces(&happy_path_traces(), 0.05);

        assert_eq!(stats.margin_samples, 3);
        assert_eq!(stats.margins.len(), 3);
        assert!((stats.margins[0] - 0.02).abs() < 1e-9);
        assert!((stats.margins[2] - 0.2).abs() < 1e-9);
        assert_eq!(stats.accept_count, 3);
        assert_eq!(stats.near_count, 1);
        assert!((stats.near_threshold_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn trace_metrics_carry_cross_references() {
        let stats = analyze_traces(&happy_path_traces(), 0.05);
        let metrics = trace_metrics(&stats, &MonitorConfig::default());

        let names = metrics.iter().map(|m| m.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                MetricName::CandidateScoreMarginMean,
                MetricName::CandidateScoreMarginP10,
                MetricName::MergeNearThresholdRate,
            ]
        );
        assert!((metrics[0].value - 0.14).abs() < 1e-9);
        assert_eq!(metrics[0].status, MetricStatus::Ok);
        assert!((metrics[1].value - 0.056).abs() < 1e-9);
        assert_eq!(metrics[1].status, MetricStatus::Ok);
        assert_eq!(metrics[0].metadata.get("p10"), Some(&json!(metrics[1].value)));
        assert_eq!(metrics[1].metadata.get("mean"), Some(&json!(metrics[0].value)));
        assert_eq!(metrics[2].status, MetricStatus::Warn);
        assert_eq!(metrics[2].samples, 3);
        assert_eq!(metrics[2].metadata.get("accept_count"), Some(&json!(3)));
        assert_eq!(metrics[2].metadata.get("near_count"), Some(&json!(1)));
    }

    #[test]
    fn single_score_counts_toward_rate_but_not_margins() {
        let traces = vec![trace(
            "t-single",
            json!([{"score": 0.81}]),
            Value::Null,
            json!({"threshold": 0.8}),
        )];
        let stats = analyze_traces(&traces, 0.05);
        assert_eq!(stats.margin_samples, 0);
        assert!(stats.margins.is_empty());
        assert_eq!(stats.accept_count, 1);
        assert_eq!(stats.near_count, 1);
    }

    #[test]
    fn chosen_score_backs_up_missing_candidates() {
        let traces = vec![
            trace("t-chosen", Value::Null, json!({"confidence": 0.95}), json!(0.7)),
            trace("t-zero", Value::Null, json!({"label": "x"}), json!(0.7)),
            trace("t-no-threshold", json!([0.9]), Value::Null, json!({"mode": "auto"})),
            trace("t-rejected", json!([0.4]), Value::Null, json!({"threshold": 0.7})),
        ];
        let stats = analyze_traces(&traces, 0.05);
        assert_eq!(stats.accept_count, 1);
        assert_eq!(stats.near_count, 0);
        assert_eq!(stats.near_threshold_rate, 0.0);
    }

    #[test]
    fn no_margins_yield_insufficient_zero_metrics() {
        let stats = analyze_traces(&[], 0.05);
        let metrics = trace_metrics(&stats, &MonitorConfig::default());
        for metric in &metrics {
            assert_eq!(metric.value, 0.0);
            assert_eq!(metric.samples, 0);
            assert_eq!(metric.status, MetricStatus::Insufficient);
        }
    }

    #[test]
    fn non_positive_margin_falls_back_to_default() {
        let traces = vec![trace(
            "t-1",
            json!([0.84]),
            Value::Null,
            json!({"threshold": 0.8}),
        )];
        let stats = analyze_traces(&traces, 0.0);
        assert_eq!(stats.near_count, 1);
        let stats = analyze_traces(&traces, 0.01);
        assert_eq!(stats.near_count, 0);
    }

    fn score_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            (-2.0f64..2.0).prop_map(|score| json!(score)),
            (-2.0f64..2.0).prop_map(|score| json!({"score": score.to_string()})),
            Just(json!("NaN")),
            Just(json!("inf")),
            Just(json!({"score": "-inf"})),
        ]
    }

    proptest! {
        #[test]
        fn non_finite_scores_never_reach_metric_values(
            candidates in prop::collection::vec(prop::collection::vec(score_value(), 0..5), 0..8),
            threshold in score_value(),
        ) {
            let traces = candidates
                .into_iter()
                .enumerate()
                .map(|(idx, scores)| {
                    trace(
                        format!("t-{idx}").as_str(),
                        Value::Array(scores),
                        json!("inf"),
                        json!({"threshold": threshold.clone()}),
                    )
                })
                .collect::<Vec<_>>();
            let stats = analyze_traces(&traces, 0.05);
            for metric in trace_metrics(&stats, &MonitorConfig::default()) {
                prop_assert!(metric.value.is_finite());
                prop_assert_eq!(metric.status == MetricStatus::Insufficient, metric.samples == 0);
            }
        }
    }
}
