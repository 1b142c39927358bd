//! Spells: maximal runs of one worker's consecutive rows at one firm.

use std::ops::Range;

use crate::records::{LongRecord, Slot, Span};

/// Index ranges of consecutive rows with the same worker and firm.
///
/// Gaps in time do not break a run.
pub fn runs(records: &[LongRecord]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for r in 1..=records.len() {
        let boundary = r == records.len()
            || records[r].i != records[start].i
            || records[r].slot.j != records[start].slot.j;
        if boundary {
            if start < r {
                out.push(start..r);
            }
            start = r;
        }
    }
    out
}

/// Merge a run into one spell.
///
/// The outcome is the weighted mean, the weight is summed, the span covers
/// the first to the last period, and the cluster is taken from the first row.
fn merge(rows: &[LongRecord]) -> LongRecord {
    let first = &rows[0];
    if rows.len() == 1 {
        let mut spell = first.clone();
        spell.slot.w = Some(first.slot.weight());
        return spell;
    }

    let weight: f64 = rows.iter().map(|r| r.slot.weight()).sum();
    let y = if weight > 0.0 {
        rows.iter().map(|r| r.slot.weight() * r.slot.y).sum::<f64>() / weight
    } else {
        rows.iter().map(|r| r.slot.y).sum::<f64>() / rows.len() as f64
    };
    let t = match (first.slot.t, rows[rows.len() - 1].slot.t) {
        (Some(a), Some(b)) => Some(Span {
            first: a.first,
            last: b.last,
        }),
        _ => None,
    };

    LongRecord {
        i: first.i,
        slot: Slot {
            j: first.slot.j,
            y,
            t,
            g: first.slot.g,
            w: Some(weight),
        },
    }
}

/// Long rows to spells.
pub fn collapse(records: &[LongRecord]) -> Vec<LongRecord> {
    runs(records).into_iter().map(|run| merge(&records[run])).collect()
}

/// Spells to long rows: one row per period with the spell's outcome and an
/// even share of its weight. Without periods each spell yields one row.
pub fn uncollapse(records: &[LongRecord]) -> Vec<LongRecord> {
    let mut out = Vec::with_capacity(records.len());
    for spell in records {
        let Some(span) = spell.slot.t else {
            out.push(spell.clone());
            continue;
        };
        let n = span.periods().max(1);
        for t in span.first..=span.last {
            out.push(LongRecord {
                i: spell.i,
                slot: Slot {
                    t: Some(Span::point(t)),
                    w: spell.slot.w.map(|w| w / n as f64),
                    ..spell.slot.clone()
                },
            });
        }
    }
    out
}

/// Merge adjacent spells at the same firm, e.g. after the spell between
/// them was dropped. With `drop_multiples` such runs are dropped instead.
pub fn recollapse(records: &[LongRecord], drop_multiples: bool) -> Vec<LongRecord> {
    runs(records)
        .into_iter()
        .filter_map(|run| match run.len() {
            1 => Some(records[run.start].clone()),
            _ if drop_multiples => None,
            _ => Some(merge(&records[run])),
        })
        .collect()
}
