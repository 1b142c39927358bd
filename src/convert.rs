//! Conversions between the four formats.
//!
//! Every conversion goes through the long view of the data (long rows or
//! spells), so `pair` and `unpair` are the only reshaping primitives besides
//! spell collapsing.

use crate::collapse::{collapse, uncollapse};
use crate::error::Result;
use crate::format::Format;
use crate::frame::BipartiteFrame;
use crate::records::{read_event, read_long, write_event, write_long, EventRecord, LongRecord};

/// Consecutive rows of one worker, assuming rows are grouped by worker.
pub(crate) fn worker_blocks<T>(rows: &[T], worker: impl Fn(&T) -> i64) -> Vec<&[T]> {
    let mut out = Vec::new();
    let mut start = 0;
    for r in 1..=rows.len() {
        if r == rows.len() || worker(&rows[r]) != worker(&rows[start]) {
            if start < r {
                out.push(&rows[start..r]);
            }
            start = r;
        }
    }
    out
}

/// Long rows (or spells) to event-study pairs.
///
/// Movers yield one pair per consecutive pair of observations; stayers yield
/// one self-pair per observation.
pub fn pair(records: &[LongRecord]) -> Vec<EventRecord> {
    let mut out = Vec::with_capacity(records.len());
    for block in worker_blocks(records, |r| r.i) {
        let mover = block.windows(2).any(|w| w[0].slot.j != w[1].slot.j);
        if mover {
            out.extend(block.windows(2).map(|w| EventRecord {
                i: w[0].i,
                pre: w[0].slot.clone(),
                post: w[1].slot.clone(),
            }));
        } else {
            out.extend(block.iter().map(|r| EventRecord {
                i: r.i,
                pre: r.slot.clone(),
                post: r.slot.clone(),
            }));
        }
    }
    out
}

/// Event-study pairs back to long rows (or spells).
///
/// Movers contribute the first slot of every pair plus the second slot of
/// their last pair; stayers contribute the first slot of every pair.
pub fn unpair(records: &[EventRecord]) -> Vec<LongRecord> {
    let mut out = Vec::with_capacity(records.len() + 1);
    for block in worker_blocks(records, |r| r.i) {
        out.extend(block.iter().map(|r| LongRecord {
            i: r.i,
            slot: r.pre.clone(),
        }));
        if block.iter().any(EventRecord::is_move) {
            if let Some(last) = block.last() {
                out.push(LongRecord {
                    i: last.i,
                    slot: last.post.clone(),
                });
            }
        }
    }
    out
}

impl BipartiteFrame {
    /// Rows in the single-slot format with the same collapsing.
    pub(crate) fn long_records(&self) -> Result<(Vec<LongRecord>, Format)> {
        let long = self.format.long_counterpart();
        let records = if self.format.is_event_study() {
            unpair(&read_event(&self.data, self.format, self.columns)?)
        } else {
            read_long(&self.data, self.format, self.columns)?
        };
        Ok((records, long))
    }

    /// Convert to another format, carrying invariants and id references over.
    ///
    /// Expects clean data: nulls in i, j, y or the periods are an error.
    pub fn to_format(&self, target: Format) -> Result<Self> {
        if target == self.format {
            return Ok(self.clone());
        }

        let (records, from) = self.long_records()?;
        let mut columns = self.columns;
        let records = match (from.is_collapsed(), target.is_collapsed()) {
            (false, true) => {
                columns.w = true;
                collapse(&records)
            }
            (true, false) => uncollapse(&records),
            _ => records,
        };

        let data = if target.is_event_study() {
            write_event(&pair(&records), target, columns)?
        } else {
            write_long(&records, target, columns)?
        };
        tracing::debug!(from = %self.format, to = %target, rows = data.height(), "converted format");
        Ok(self.with_data(data, target, columns))
    }

    pub fn to_long(&self) -> Result<Self> {
        self.to_format(Format::Long)
    }

    pub fn to_collapsed_long(&self) -> Result<Self> {
        self.to_format(Format::CollapsedLong)
    }

    pub fn to_event_study(&self) -> Result<Self> {
        self.to_format(Format::EventStudy)
    }

    pub fn to_collapsed_event_study(&self) -> Result<Self> {
        self.to_format(Format::CollapsedEventStudy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Slot, Span};

    fn row(i: i64, j: i64, t: i64) -> LongRecord {
        LongRecord {
            i,
            slot: Slot {
                j,
                y: t as f64,
                t: Some(Span::point(t)),
                g: None,
                w: None,
            },
        }
    }

    #[test]
    fn stayers_pair_with_themselves() {
        let pairs = pair(&[row(0, 1, 1), row(0, 1, 2)]);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.pre == p.post));
    }

    #[test]
    fn movers_pair_consecutive_rows() {
        let pairs = pair(&[row(0, 1, 1), row(0, 2, 2), row(0, 2, 3)]);
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].pre.j, pairs[0].post.j), (1, 2));
        assert_eq!((pairs[1].pre.j, pairs[1].post.j), (2, 2));
    }

    #[test]
    fn unpair_inverts_pair() {
        let rows = vec![
            row(0, 1, 1),
            row(0, 2, 2),
            row(0, 2, 3),
            row(1, 4, 1),
            row(1, 4, 2),
            row(2, 5, 7),
        ];
        assert_eq!(unpair(&pair(&rows)), rows);
    }
}
