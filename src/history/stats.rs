//! Aggregate statistics and regeneration hints over the history ledger.

use super::entry::{HistoryEntry, REASON_SAME_SYMPTOMS, REASON_SYMPTOMS_UPDATED};
use serde::Serialize;
use std::collections::HashMap;

const TOP_REASONS: usize = 5;
const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasonCount {
    pub reason: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStatistics {
    pub total_consultations: usize,
    pub regeneration_count: usize,
    /// Mean gap between consecutive entries of the same session.
    pub average_regeneration_interval_ms: f64,
    pub most_common_reasons: Vec<ReasonCount>,
}

pub(crate) fn compute(entries: &[HistoryEntry]) -> HistoryStatistics {
    let mut by_session: HashMap<&str, Vec<u64>> = HashMap::new();
    for e in entries {
        by_session.entry(e.session_id.as_str()).or_default().push(e.timestamp_ms);
    }
    let mut total_gap: u128 = 0;
    let mut gaps: u64 = 0;
    for stamps in by_session.values_mut() {
        stamps.sort_unstable();
        for pair in stamps.windows(2) {
            total_gap += u128::from(pair[1] - pair[0]);
            gaps += 1;
        }
    }

    HistoryStatistics {
        total_consultations: entries.len(),
        regeneration_count: entries.iter().filter(|e| e.is_regeneration()).count(),
        average_regeneration_interval_ms: if gaps == 0 {
            0.0
        } else {
            total_gap as f64 / gaps as f64
        },
        most_common_reasons: common_reasons(entries, TOP_REASONS),
    }
}

/// Reasons by descending frequency; ties break alphabetically.
fn common_reasons(entries: &[HistoryEntry], top: usize) -> Vec<ReasonCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for reason in entries.iter().filter_map(|e| e.regeneration_reason.as_deref()) {
        *counts.entry(reason).or_insert(0) += 1;
    }
    let mut ranked: Vec<ReasonCount> = counts
        .into_iter()
        .map(|(reason, count)| ReasonCount {
            reason: reason.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    ranked.truncate(top);
    ranked
}

/// Hints for the next regeneration in a session.
///
/// `session` is most recent first; `all` is the whole ledger.
pub(crate) fn suggest(session: &[HistoryEntry], all: &[HistoryEntry]) -> Vec<String> {
    let Some(latest) = session.first() else {
        return Vec::new();
    };
    let mut hints = Vec::new();

    if latest.has_symptoms() {
        hints.push("Describe how your symptoms have changed since the last consultation".to_string());
    } else {
        hints.push("Add a description of your symptoms for a more specific consultation".to_string());
    }

    if session.iter().any(|e| e.is_regeneration()) {
        hints.push("Ask what differs from the previous consultation".to_string());
    } else {
        hints.push("Ask for a simpler explanation of the assessment".to_string());
        hints.push("Mention how long the symptoms have lasted".to_string());
    }

    for rc in common_reasons(all, TOP_REASONS) {
        if hints.len() >= MAX_SUGGESTIONS {
            break;
        }
        let implied = rc.reason == REASON_SYMPTOMS_UPDATED
            || rc.reason == REASON_SAME_SYMPTOMS
            || latest.regeneration_reason.as_deref() == Some(rc.reason.as_str());
        if !implied {
            hints.push(format!("Regenerate focusing on: {}", rc.reason.replace('_', " ")));
        }
    }
    hints
}
