//! Human-readable summary of a frame.

use std::fmt;

use polars::prelude::*;

use crate::error::Result;
use crate::format::Format;
use crate::frame::{BipartiteFrame, Invariants};
use crate::schema::{values, Logical};

/// Outcome statistics pooled over every outcome sub-column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population variance.
    pub var: f64,
}

impl OutcomeStats {
    /// NaNs and nulls are ignored; `None` when nothing else is left.
    pub fn from_chunked(y: &Float64Chunked) -> Result<Option<Self>> {
        let y = y.filter(&y.is_not_nan())?;
        let (Some(mean), Some(median), Some(min), Some(max), Some(var)) =
            (y.mean(), y.median(), y.min(), y.max(), y.var(0))
        else {
            return Ok(None);
        };
        Ok(Some(Self {
            mean,
            median,
            min,
            max,
            var,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub format: Format,
    pub workers: usize,
    pub firms: usize,
    pub observations: usize,
    pub outcome: Option<OutcomeStats>,
    pub invariants: Invariants,
}

impl BipartiteFrame {
    pub fn summary(&self) -> Result<Summary> {
        let mut y = Float64Chunked::from_slice(values::Y.into(), &[]);
        for sub in self.format.subcolumns(Logical::Y) {
            let column = self.data.column(sub)?.cast(&DataType::Float64)?;
            y.append(column.f64()?)?;
        }

        Ok(Summary {
            format: self.format,
            workers: self.n_workers()?,
            firms: self.n_firms()?,
            observations: self.height(),
            outcome: OutcomeStats::from_chunked(&y)?,
            invariants: self.invariants,
        })
    }
}

fn optional<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "format: {}", self.format)?;
        writeln!(f, "number of workers: {}", self.workers)?;
        writeln!(f, "number of firms: {}", self.firms)?;
        writeln!(f, "number of observations: {}", self.observations)?;
        if let Some(y) = &self.outcome {
            writeln!(f, "mean outcome: {}", y.mean)?;
            writeln!(f, "median outcome: {}", y.median)?;
            writeln!(f, "min outcome: {}", y.min)?;
            writeln!(f, "max outcome: {}", y.max)?;
            writeln!(f, "var(outcome): {}", y.var)?;
        }
        let inv = &self.invariants;
        writeln!(f, "no NaN values: {}", inv.no_na)?;
        writeln!(f, "no duplicates: {}", inv.no_duplicates)?;
        writeln!(f, "i-t observations unique: {}", optional(inv.i_t_unique))?;
        writeln!(f, "contiguous i ids: {}", inv.contiguous.i)?;
        writeln!(f, "contiguous j ids: {}", inv.contiguous.j)?;
        writeln!(f, "contiguous g ids: {}", optional(inv.contiguous.g))?;
        write!(f, "connectedness: {}", optional(inv.connectedness))
    }
}
