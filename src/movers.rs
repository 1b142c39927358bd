//! Mover flags.
//!
//! `m` is derived from the row order of `i` and the firm columns and is
//! never trusted from input.

use std::collections::{HashMap, HashSet};

use polars::prelude::*;

use crate::collapse::recollapse;
use crate::error::{BipartiteError, Result};
use crate::format::Format;
use crate::frame::BipartiteFrame;
use crate::params::CleanParams;
use crate::records::{int_values, read_long, write_long};
use crate::schema::{values, Logical};

/// Flags for single-slot rows.
///
/// A row moves towards its predecessor (successor) when both belong to the
/// same worker at different firms. Long rows flag either direction with 1;
/// collapsed rows count both directions, giving 0, 1 or 2.
pub fn long_flags(i: &[Option<i64>], j: &[Option<i64>], count_both: bool) -> Vec<i64> {
    let n = i.len();
    (0..n)
        .map(|r| {
            let prev = r > 0 && i[r - 1] == i[r] && j[r - 1] != j[r];
            let next = r + 1 < n && i[r + 1] == i[r] && j[r + 1] != j[r];
            if count_both {
                prev as i64 + next as i64
            } else {
                (prev || next) as i64
            }
        })
        .collect()
}

/// Flags for paired rows: 1 when the pair spans two firms.
pub fn event_flags(j1: &[Option<i64>], j2: &[Option<i64>]) -> Vec<i64> {
    j1.iter().zip(j2).map(|(a, b)| (a != b) as i64).collect()
}

/// Recompute the `m` column in place.
pub fn attach_m(df: &mut DataFrame, format: Format) -> Result<()> {
    let m = flags(df, format)?;
    df.with_column(Column::new(values::M.into(), m))?;
    Ok(())
}

fn flags(df: &DataFrame, format: Format) -> Result<Vec<i64>> {
    let firms = format.subcolumns(Logical::J);
    if format.is_event_study() {
        let j1 = int_values(df, firms[0])?;
        let j2 = int_values(df, firms[1])?;
        Ok(event_flags(&j1, &j2))
    } else {
        let i = int_values(df, Logical::I.name())?;
        let j = int_values(df, firms[0])?;
        Ok(long_flags(&i, &j, format.is_collapsed()))
    }
}

/// Workers with at least one flagged row.
pub fn mover_workers(df: &DataFrame) -> Result<HashSet<i64>> {
    let i = int_values(df, Logical::I.name())?;
    let m = int_values(df, values::M)?;
    Ok(i.into_iter()
        .zip(m)
        .filter_map(|(i, m)| match (i, m) {
            (Some(i), Some(m)) if m > 0 => Some(i),
            _ => None,
        })
        .collect())
}

impl BipartiteFrame {
    /// Firms where at least `threshold` distinct movers are observed.
    pub fn min_movers_firms(&self, threshold: usize) -> Result<Vec<i64>> {
        if threshold == 0 {
            return self.unique_ids(Logical::J);
        }

        let i = int_values(&self.data, Logical::I.name())?;
        let m = int_values(&self.data, values::M)?;
        let mut movers: HashMap<i64, HashSet<i64>> = HashMap::new();
        for sub in self.format.subcolumns(Logical::J) {
            let j = int_values(&self.data, sub)?;
            for ((i, j), m) in i.iter().zip(j).zip(&m) {
                if let (Some(i), Some(j), Some(m)) = (i, j, m) {
                    if *m > 0 {
                        movers.entry(j).or_default().insert(*i);
                    }
                }
            }
        }

        let mut firms: Vec<i64> = movers
            .into_iter()
            .filter(|(_, workers)| workers.len() >= threshold)
            .map(|(j, _)| j)
            .collect();
        firms.sort_unstable();
        Ok(firms)
    }

    /// Keep only firms with at least `threshold` movers.
    ///
    /// Dropping firms can turn movers into stayers, so the filter repeats
    /// until the row count is stable, capped by `params.fixed_point`.
    /// Collapsed long data is recollapsed after every pass.
    pub fn min_movers_frame(&self, threshold: usize, params: &CleanParams) -> Result<Self> {
        params.validate()?;
        let mut frame = self.clone();
        if threshold == 0 {
            return Ok(frame);
        }

        let mut iterations = 0;
        loop {
            let rows = frame.height();
            let firms = frame.min_movers_firms(threshold)?;
            frame.keep_ids(Logical::J, &firms)?;
            if frame.format == Format::CollapsedLong {
                let records = read_long(&frame.data, frame.format, frame.columns)?;
                let merged = recollapse(&records, params.drop_multiples);
                if merged.len() != records.len() {
                    let data = write_long(&merged, frame.format, frame.columns)?;
                    frame.set_data(data);
                }
            }
            iterations += 1;
            tracing::debug!(
                iteration = iterations,
                rows_before = rows,
                rows_after = frame.height(),
                "min movers pass"
            );

            if frame.height() == rows {
                break;
            }
            if iterations >= params.fixed_point.max_iterations {
                tracing::error!(
                    iterations,
                    rows = frame.height(),
                    "min movers filter did not reach a fixed point"
                );
                return Err(BipartiteError::FixedPointNonConvergence {
                    iterations,
                    rows: frame.height(),
                });
            }
        }
        Ok(frame)
    }
}
