use serde_json::{Map, Value};

pub const MAX_PROBE_DEPTH: usize = 4;

pub const SCORE_KEYS: [&str; 7] = [
    "score",
    "similarity",
    "confidence",
    "prob",
    "probability",
    "weight",
    "rank_score",
];

pub const CONTAINER_KEYS: [&str; 4] = ["candidates", "options", "alternatives", "choices"];

pub const THRESHOLD_KEY_FRAGMENTS: [&str; 4] =
    ["threshold", "min_score", "min_similarity", "score_min"];

/// Coerces a JSON scalar to `f64`. Non-finite results are returned as-is.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            text.parse::<f64>().ok()
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Collects every candidate score found within [`MAX_PROBE_DEPTH`], dropping NaN and infinities.
/// Scores keep their discovery order.
pub fn extract_candidate_scores(raw: &Value) -> Vec<f64> {
    let mut scores = Vec::new();
    collect_candidate_scores(raw, 0, &mut scores);
    scores
}

/// First score-like number in `raw`, or `0.0` when nothing numeric is found.
/// Callers treat `0.0` as absent.
pub fn extract_chosen_score(raw: &Value) -> f64 {
    first_score(raw, 0).unwrap_or(0.0)
}

/// Looks for a threshold-named key first and falls back to any numeric leaf.
pub fn extract_threshold(raw: &Value) -> Option<f64> {
    named_threshold(raw, 0).or_else(|| first_numeric_leaf(raw, 0))
}

fn collect_candidate_scores(value: &Value, depth: usize, out: &mut Vec<f64>) {
    if depth > MAX_PROBE_DEPTH {
        return;
    }

    match value {
        Value::Object(map) => {
            let own_score = score_from_keys(map);
            if let Some(score) = own_score.filter(|score| score.is_finite()) {
                out.push(score);
            }

            let containers = map
                .iter()
                .filter(|(key, _)| is_container_key(key))
                .map(|(_, child)| child)
                .collect::<Vec<_>>();
            if !containers.is_empty() {
                for child in containers {
                    collect_candidate_scores(child, depth + 1, out);
                }
            } else if own_score.is_none() {
                for child in map.values() {
                    collect_candidate_scores(child, depth + 1, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_candidate_scores(item, depth + 1, out);
            }
        }
        Value::String(_) | Value::Number(_) => {
            if let Some(score) = coerce_f64(value).filter(|score| score.is_finite()) {
                out.push(score);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

fn first_score(value: &Value, depth: usize) -> Option<f64> {
    if depth > MAX_PROBE_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => score_from_keys(map)
            .or_else(|| map.values().find_map(|child| first_score(child, depth + 1))),
        Value::Array(items) => items.iter().find_map(|item| first_score(item, depth + 1)),
        Value::String(_) | Value::Number(_) => coerce_f64(value),
        Value::Bool(_) | Value::Null => None,
    }
}

fn named_threshold(value: &Value, depth: usize) -> Option<f64> {
    if depth > MAX_PROBE_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| is_threshold_key(key))
            .find_map(|(_, child)| coerce_f64(child))
            .or_else(|| {
                map.values()
                    .find_map(|child| named_threshold(child, depth + 1))
            }),
        Value::Array(items) => items
            .iter()
            .find_map(|item| named_threshold(item, depth + 1)),
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => None,
    }
}

fn first_numeric_leaf(value: &Value, depth: usize) -> Option<f64> {
    if depth > MAX_PROBE_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => map
            .values()
            .find_map(|child| first_numeric_leaf(child, depth + 1)),
        Value::Array(items) => items
            .iter()
            .find_map(|item| first_numeric_leaf(item, depth + 1)),
        Value::String(_) | Value::Number(_) => coerce_f64(value),
        Value::Bool(_) | Value::Null => None,
    }
}

fn score_from_keys(map: &Map<String, Value>) -> Option<f64> {
    SCORE_KEYS.iter().find_map(|wanted| {
        map.iter()
            .filter(|(key, _)| normalize_key(key) == *wanted)
            .find_map(|(_, value)| coerce_f64(value))
    })
}

fn is_container_key(key: &str) -> bool {
    let key = normalize_key(key);
    CONTAINER_KEYS.contains(&key.as_str())
}

fn is_threshold_key(key: &str) -> bool {
    let key = normalize_key(key);
    THRESHOLD_KEY_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
