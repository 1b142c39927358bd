//! Plumbing for assigning firms to clusters.
//!
//! Computing features and grouping them are left to callers; this module
//! writes the resulting group ids into the cluster column(s) and re-cleans
//! when unclustered rows are dropped.

use std::collections::HashMap;

use polars::prelude::*;

use crate::error::{BipartiteError, Result};
use crate::frame::BipartiteFrame;
use crate::params::CleanParams;
use crate::records::{float_values, int_values};
use crate::schema::{ids, values, Logical};

/// One feature vector per firm.
#[derive(Debug, Clone, PartialEq)]
pub struct FirmFeatures {
    pub firms: Vec<i64>,
    pub features: Vec<Vec<f64>>,
    /// Observation weight behind each firm's features.
    pub weights: Vec<f64>,
}

/// Computes firm features from a cleaned frame.
pub trait FirmMeasure {
    fn measure(&self, frame: &BipartiteFrame) -> Result<FirmFeatures>;
}

/// Maps firm features to a group id per firm; `None` leaves a firm unclustered.
pub trait FirmGrouping {
    fn group(&self, features: &FirmFeatures) -> Result<Vec<Option<i64>>>;
}

impl<F> FirmGrouping for F
where
    F: Fn(&FirmFeatures) -> Result<Vec<Option<i64>>>,
{
    fn group(&self, features: &FirmFeatures) -> Result<Vec<Option<i64>>> {
        self(features)
    }
}

/// Weighted mean outcome per firm, pooled over every slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmMeanOutcome;

impl FirmMeasure for FirmMeanOutcome {
    fn measure(&self, frame: &BipartiteFrame) -> Result<FirmFeatures> {
        let format = frame.format();
        let weighted = frame.has_column(Logical::W);

        // One (j, y, w) frame per slot, stacked.
        let slots = format
            .subcolumns(Logical::J)
            .iter()
            .zip(format.subcolumns(Logical::Y))
            .zip(format.subcolumns(Logical::W))
            .map(|((j, y), w)| {
                let weight = if weighted {
                    col(*w).cast(DataType::Float64)
                } else {
                    lit(1.0)
                };
                frame.data().clone().lazy().select([
                    col(*j).cast(DataType::Int64).alias(ids::J),
                    col(*y).cast(DataType::Float64).alias(values::Y),
                    weight.alias(values::W),
                ])
            })
            .collect::<Vec<_>>();

        let weight = col(values::W).sum();
        let firms = concat(slots, UnionArgs::default())?
            .filter(
                col(ids::J)
                    .is_not_null()
                    .and(col(values::Y).is_not_null())
                    .and(col(values::W).is_not_null()),
            )
            .group_by([col(ids::J)])
            .agg([
                when(weight.clone().gt(lit(0.0)))
                    .then((col(values::Y) * col(values::W)).sum() / weight.clone())
                    .otherwise(lit(0.0))
                    .alias(values::Y),
                weight.alias(values::W),
            ])
            .collect()?
            .sort(vec![ids::J], SortMultipleOptions::default())?;

        let features = float_values(&firms, values::Y)?
            .into_iter()
            .map(|mean| vec![mean.unwrap_or(0.0)])
            .collect();
        Ok(FirmFeatures {
            firms: int_values(&firms, ids::J)?.into_iter().flatten().collect(),
            features,
            weights: float_values(&firms, values::W)?
                .into_iter()
                .map(|w| w.unwrap_or(0.0))
                .collect(),
        })
    }
}

/// Options for [`BipartiteFrame::cluster`].
#[derive(Debug, Clone, Default)]
pub struct ClusterParams {
    /// Drop rows at unclustered firms and clean again.
    pub drop_unclustered: bool,
    /// Parameters for that clean; defaults keep the frame's current connectedness.
    pub clean: Option<CleanParams>,
}

impl BipartiteFrame {
    /// Assign a cluster to every firm and write it to the cluster column(s).
    ///
    /// Existing cluster columns are replaced. Returns a new frame.
    pub fn cluster(
        &self,
        measure: &dyn FirmMeasure,
        grouping: &dyn FirmGrouping,
        params: &ClusterParams,
    ) -> Result<Self> {
        let features = measure.measure(self)?;
        let groups = grouping.group(&features)?;
        if groups.len() != features.firms.len() {
            return Err(BipartiteError::InvalidData(format!(
                "grouping returned {} groups for {} firms",
                groups.len(),
                features.firms.len()
            )));
        }
        let assignment: HashMap<i64, Option<i64>> =
            features.firms.iter().copied().zip(groups).collect();

        let mut frame = self.clone();
        for (firm_col, group_col) in self
            .format
            .subcolumns(Logical::J)
            .iter()
            .zip(self.format.subcolumns(Logical::G))
        {
            let g: Vec<Option<i64>> = int_values(&self.data, firm_col)?
                .into_iter()
                .map(|j| j.and_then(|j| assignment.get(&j).copied().flatten()))
                .collect();
            frame.data.with_column(Column::new((*group_col).into(), g))?;
        }
        frame.columns.g = true;
        frame.data = frame.data.select(frame.canonical_columns())?;
        *frame.references.slot(Logical::G) = None;

        let unclustered = frame
            .format
            .subcolumns(Logical::G)
            .iter()
            .map(|sub| Ok(frame.data.column(sub)?.null_count()))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sum::<usize>();
        frame.invariants.contiguous.g = Some(false);
        tracing::info!(
            clusters = frame.n_unique_ids(Logical::G)?,
            unclustered,
            "assigned firm clusters"
        );

        if unclustered == 0 {
            frame.contiguous_ids(Logical::G)?;
            return Ok(frame);
        }
        if !params.drop_unclustered {
            return Ok(frame);
        }

        let mut mask: Option<BooleanChunked> = None;
        for sub in frame.format.subcolumns(Logical::G) {
            let present = frame.data.column(sub)?.is_not_null();
            mask = Some(match mask {
                Some(mask) => &mask & &present,
                None => present,
            });
        }
        if let Some(mask) = mask {
            frame.keep_rows(&mask)?;
        }

        let clean = params.clean.clone().unwrap_or_else(|| {
            CleanParams::default().with_connectedness(self.invariants.connectedness)
        });
        frame.clean(&clean.with_copy(false))
    }
}
