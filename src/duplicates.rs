//! Worker-period duplicate resolution.

use std::collections::{HashMap, HashSet};

use crate::records::{EventRecord, LongRecord};
use crate::params::DuplicateHow;

/// Collapse rows sharing a worker and start period into one row.
///
/// Groups keep the position of their first row. `Max` keeps the highest
/// outcome row (first on ties); `Sum` and `Mean` keep that row's firm and
/// other fields but replace its outcome with the group's sum or mean.
/// Returns `None` when there is nothing to resolve.
pub fn resolve_worker_periods(records: &[LongRecord], how: DuplicateHow) -> Option<Vec<LongRecord>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut index: HashMap<(i64, i64), usize> = HashMap::new();

    for (row, record) in records.iter().enumerate() {
        let Some(span) = record.slot.t else {
            groups.push(vec![row]);
            continue;
        };
        let group = *index.entry((record.i, span.first)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(row);
    }

    if groups.len() == records.len() {
        return None;
    }

    let resolved = groups
        .into_iter()
        .map(|rows| {
            let best = rows
                .iter()
                .copied()
                .reduce(|best, r| {
                    if records[r].slot.y > records[best].slot.y {
                        r
                    } else {
                        best
                    }
                })
                .unwrap_or(rows[0]);

            let mut record = records[best].clone();
            if rows.len() > 1 {
                let total: f64 = rows.iter().map(|r| records[*r].slot.y).sum();
                match how {
                    DuplicateHow::Max => {}
                    DuplicateHow::Sum => record.slot.y = total,
                    DuplicateHow::Mean => record.slot.y = total / rows.len() as f64,
                }
            }
            record
        })
        .collect();
    Some(resolved)
}

/// Drop exact duplicate rows, keeping the first. `None` when there are none.
pub fn drop_exact_long(records: &[LongRecord]) -> Option<Vec<LongRecord>> {
    let mut seen = HashSet::new();
    let kept: Vec<LongRecord> = records
        .iter()
        .filter(|r| seen.insert(r.key()))
        .cloned()
        .collect();
    (kept.len() < records.len()).then_some(kept)
}

pub fn drop_exact_event(records: &[EventRecord]) -> Option<Vec<EventRecord>> {
    let mut seen = HashSet::new();
    let kept: Vec<EventRecord> = records
        .iter()
        .filter(|r| seen.insert(r.key()))
        .cloned()
        .collect();
    (kept.len() < records.len()).then_some(kept)
}
