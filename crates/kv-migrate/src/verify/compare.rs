//! Per-type content comparison.
//!
//! Each comparator returns every discrepancy it finds, not just the first.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::Value;

/// Longest value rendered in a mismatch message.
const PREVIEW_CHARS: usize = 64;

/// Compare two values of the same type. Values of different types produce a
/// single type mismatch entry.
pub fn compare_values(source: &Value, target: &Value, score_epsilon: f64) -> Vec<String> {
    match (source, target) {
        (Value::String(s), Value::String(t)) => compare_strings(s, t),
        (Value::Hash(s), Value::Hash(t)) => compare_hashes(s, t),
        (Value::List(s), Value::List(t)) => compare_lists(s, t),
        (Value::Set(s), Value::Set(t)) => compare_sets(s, t),
        (Value::ZSet(s), Value::ZSet(t)) => compare_zsets(s, t, score_epsilon),
        _ => vec![format!(
            "type mismatch: source={}, target={}",
            source.key_type(),
            target.key_type()
        )],
    }
}

pub fn compare_strings(source: &[u8], target: &[u8]) -> Vec<String> {
    if source == target {
        return Vec::new();
    }
    vec![format!(
        "string value mismatch: source length={}, target length={}",
        source.len(),
        target.len()
    )]
}

pub fn compare_hashes(
    source: &BTreeMap<String, String>,
    target: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut mismatches = Vec::new();
    for (field, source_value) in source {
        match target.get(field) {
            None => mismatches.push(format!("field '{}' missing in target", field)),
            Some(target_value) if target_value != source_value => mismatches.push(format!(
                "field '{}' value mismatch: source='{}', target='{}'",
                field,
                preview(source_value),
                preview(target_value)
            )),
            Some(_) => {}
        }
    }
    for field in target.keys().filter(|f| !source.contains_key(*f)) {
        mismatches.push(format!("field '{}' extra in target", field));
    }
    mismatches
}

pub fn compare_lists(source: &[String], target: &[String]) -> Vec<String> {
    let mut mismatches = Vec::new();
    if source.len() != target.len() {
        mismatches.push(format!(
            "list length mismatch: source={}, target={}",
            source.len(),
            target.len()
        ));
    }
    for (index, (s, t)) in source.iter().zip(target).enumerate() {
        if s != t {
            mismatches.push(format!(
                "index {} mismatch: source='{}', target='{}'",
                index,
                preview(s),
                preview(t)
            ));
        }
    }
    mismatches
}

pub fn compare_sets(source: &BTreeSet<String>, target: &BTreeSet<String>) -> Vec<String> {
    source
        .difference(target)
        .map(|m| format!("member '{}' missing in target", m))
        .chain(
            target
                .difference(source)
                .map(|m| format!("member '{}' extra in target", m)),
        )
        .collect()
}

/// Compare sorted sets by member. Scores differing by more than
/// `score_epsilon` are reported; an epsilon of 0 means exact equality.
pub fn compare_zsets(
    source: &[(String, f64)],
    target: &[(String, f64)],
    score_epsilon: f64,
) -> Vec<String> {
    let target_scores: HashMap<&str, f64> =
        target.iter().map(|(m, s)| (m.as_str(), *s)).collect();
    let source_members: BTreeSet<&str> = source.iter().map(|(m, _)| m.as_str()).collect();

    let mut mismatches = Vec::new();
    for (member, score) in source {
        match target_scores.get(member.as_str()) {
            None => mismatches.push(format!("member '{}' missing in target", member)),
            Some(target_score) if !scores_equal(*score, *target_score, score_epsilon) => {
                mismatches.push(format!(
                    "member '{}' score mismatch: source={}, target={}",
                    member, score, target_score
                ))
            }
            Some(_) => {}
        }
    }
    for (member, _) in target {
        if !source_members.contains(member.as_str()) {
            mismatches.push(format!("member '{}' extra in target", member));
        }
    }
    mismatches
}

fn scores_equal(a: f64, b: f64, epsilon: f64) -> bool {
    if epsilon <= 0.0 {
        return a == b;
    }
    (a - b).abs() <= epsilon
}

fn preview(value: &str) -> String {
    if value.chars().count() <= PREVIEW_CHARS {
        return value.to_string();
    }
    let truncated: String = value.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", truncated)
}
