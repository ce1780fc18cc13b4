//! Merges per-strategy candidate lists into one deterministic ranking

use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{Candidate, Item, RankedResult, StrategyKind},
};

struct Merged {
    score: f64,
    /// Priority of the contributor whose reason is kept
    reason_priority: u8,
    reason: String,
    contributors: Vec<StrategyKind>,
    item: Item,
}

/// Deduplicates candidates by target, keeping the maximum score per target.
///
/// Ordering is total: score desc, then best contributor priority, then
/// `target_id`. The reason shown is that of the highest-priority strategy
/// among those holding the maximum score.
pub fn aggregate(candidates: HashMap<StrategyKind, Vec<Candidate>>) -> AppResult<Vec<RankedResult>> {
    // Visit strategies in a fixed order so the result never depends on map iteration
    let mut lists: Vec<(StrategyKind, Vec<Candidate>)> = candidates.into_iter().collect();
    lists.sort_by_key(|(kind, _)| kind.priority());

    let mut merged: HashMap<String, Merged> = HashMap::new();
    for (kind, list) in lists {
        for candidate in list {
            if !candidate.score.is_finite() || !(0.0..=1.0).contains(&candidate.score) {
                return Err(AppError::Aggregation(format!(
                    "{} produced invalid score {} for {}",
                    kind, candidate.score, candidate.target_id
                )));
            }

            match merged.get_mut(&candidate.target_id) {
                Some(entry) => {
                    if !entry.contributors.contains(&kind) {
                        entry.contributors.push(kind);
                    }
                    if candidate.score > entry.score
                        || (candidate.score == entry.score && kind.priority() < entry.reason_priority)
                    {
                        entry.score = candidate.score;
                        entry.reason_priority = kind.priority();
                        entry.reason = candidate.reason;
                    }
                }
                None => {
                    merged.insert(
                        candidate.target_id.clone(),
                        Merged {
                            score: candidate.score,
                            reason_priority: kind.priority(),
                            reason: candidate.reason,
                            contributors: vec![kind],
                            item: candidate.item,
                        },
                    );
                }
            }
        }
    }

    let mut results: Vec<(u8, RankedResult)> = merged
        .into_iter()
        .map(|(target_id, mut entry)| {
            entry.contributors.sort_by_key(|k| k.priority());
            let best_priority = entry
                .contributors
                .first()
                .map(|k| k.priority())
                .unwrap_or(u8::MAX);
            (
                best_priority,
                RankedResult {
                    target_id,
                    final_score: entry.score,
                    contributing_strategies: entry.contributors,
                    reason_text: entry.reason,
                    item: entry.item,
                },
            )
        })
        .collect();

    results.sort_by(|(pa, a), (pb, b)| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| pa.cmp(pb))
            .then_with(|| a.target_id.cmp(&b.target_id))
    });

    Ok(results.into_iter().map(|(_, result)| result).collect())
}
