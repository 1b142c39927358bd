use std::collections::BTreeSet;

use polars::prelude::*;

use crate::contiguity::{IdReference, IdReferences};
use crate::error::{BipartiteError, Result};
use crate::format::Format;
use crate::movers;
use crate::params::Connectedness;
use crate::records::{canonical_order, int_values, OptionalColumns};
use crate::schema::{ColumnMap, Logical};

/// Per-column contiguity flags; `g` is `None` when there is no cluster column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Contiguity {
    pub i: bool,
    pub j: bool,
    pub g: Option<bool>,
}

impl Contiguity {
    pub fn get(&self, logical: Logical) -> Option<bool> {
        match logical {
            Logical::I => Some(self.i),
            Logical::J => Some(self.j),
            Logical::G => self.g,
            _ => None,
        }
    }

    pub(crate) fn set(&mut self, logical: Logical, value: bool) {
        match logical {
            Logical::I => self.i = value,
            Logical::J => self.j = value,
            Logical::G => self.g = Some(value),
            _ => {}
        }
    }
}

/// Derived facts about the data, established by the cleaning stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invariants {
    pub no_na: bool,
    pub no_duplicates: bool,
    /// `None` without a period column.
    pub i_t_unique: Option<bool>,
    /// `None` until a connectivity pass has run.
    pub connectedness: Option<Connectedness>,
    pub contiguous: Contiguity,
}

impl Invariants {
    pub fn unknown(columns: OptionalColumns) -> Self {
        Self {
            no_na: false,
            no_duplicates: false,
            i_t_unique: columns.t.then_some(false),
            connectedness: None,
            contiguous: Contiguity {
                i: false,
                j: false,
                g: columns.g.then_some(false),
            },
        }
    }
}

/// A worker-firm panel together with what is known about it.
///
/// The table always holds canonical column names for its format. Public
/// row and column mutations recompute `m` and reset every invariant.
#[derive(Debug, Clone)]
pub struct BipartiteFrame {
    pub(crate) data: DataFrame,
    pub(crate) format: Format,
    pub(crate) columns: OptionalColumns,
    pub(crate) invariants: Invariants,
    pub(crate) references: IdReferences,
    pub(crate) track_id_changes: bool,
}

impl BipartiteFrame {
    /// Wrap a table that already uses canonical column names.
    pub fn new(data: DataFrame, format: Format) -> Result<Self> {
        Self::from_mapped(data, format, &ColumnMap::default())
    }

    /// Wrap a table whose columns are named through `map`.
    ///
    /// Required columns: i, j, y (with their per-format sub-columns).
    /// Optional columns are picked up only when every sub-column resolves.
    /// Any input `m` column is discarded and other columns are dropped.
    pub fn from_mapped(data: DataFrame, format: Format, map: &ColumnMap) -> Result<Self> {
        let mut selected: Vec<Column> = Vec::new();
        let mut columns = OptionalColumns::default();

        for logical in Logical::ALL {
            if logical == Logical::M {
                continue;
            }
            let subcolumns = format.subcolumns(logical);
            let found: Vec<&str> = subcolumns
                .iter()
                .map(|c| map.physical(c))
                .filter(|p| data.schema().contains(p))
                .collect();

            if found.len() == subcolumns.len() {
                for (canonical, physical) in subcolumns.iter().zip(found) {
                    selected.push(data.column(physical)?.clone().with_name((*canonical).into()));
                }
                columns.set(logical, true);
            } else if logical.is_required() {
                let missing = subcolumns
                    .iter()
                    .map(|c| map.physical(c))
                    .find(|p| !data.schema().contains(p))
                    .unwrap_or(logical.name());
                return Err(BipartiteError::MissingColumn(missing.to_string()));
            } else if !found.is_empty() {
                tracing::warn!(
                    column = %logical,
                    found = found.len(),
                    expected = subcolumns.len(),
                    "only some sub-columns present, ignoring column"
                );
            }
        }

        let mut data = DataFrame::new(selected)?;
        movers::attach_m(&mut data, format)?;

        Ok(Self {
            data,
            format,
            columns,
            invariants: Invariants::unknown(columns),
            references: IdReferences::default(),
            track_id_changes: false,
        })
    }

    /// Record original ids through every contiguity pass.
    pub fn with_id_tracking(mut self, track: bool) -> Self {
        self.track_id_changes = track;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn into_data(self) -> DataFrame {
        self.data
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn invariants(&self) -> &Invariants {
        &self.invariants
    }

    pub fn columns(&self) -> OptionalColumns {
        self.columns
    }

    pub fn has_column(&self, logical: Logical) -> bool {
        self.columns.contains(logical)
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn id_reference(&self, logical: Logical) -> Option<&IdReference> {
        self.references.get(logical)
    }

    pub fn tracks_id_changes(&self) -> bool {
        self.track_id_changes
    }

    // ── Counts ──────────────────────────────────────────────────────────────

    /// Distinct non-null values pooled over a logical column's sub-columns.
    pub fn unique_ids(&self, logical: Logical) -> Result<Vec<i64>> {
        if !self.has_column(logical) {
            return Err(BipartiteError::MissingColumn(logical.name().to_string()));
        }
        let mut ids = BTreeSet::new();
        for sub in self.format.subcolumns(logical) {
            ids.extend(int_values(&self.data, sub)?.into_iter().flatten());
        }
        Ok(ids.into_iter().collect())
    }

    pub fn n_unique_ids(&self, logical: Logical) -> Result<usize> {
        Ok(self.unique_ids(logical)?.len())
    }

    pub fn n_workers(&self) -> Result<usize> {
        self.n_unique_ids(Logical::I)
    }

    pub fn n_firms(&self) -> Result<usize> {
        self.n_unique_ids(Logical::J)
    }

    /// `None` without a cluster column.
    pub fn n_clusters(&self) -> Result<Option<usize>> {
        if self.columns.g {
            Ok(Some(self.n_unique_ids(Logical::G)?))
        } else {
            Ok(None)
        }
    }

    // ── Mutation ────────────────────────────────────────────────────────────

    /// Keep rows where `mask` is true.
    pub fn keep_rows(&mut self, mask: &BooleanChunked) -> Result<()> {
        let data = self.data.filter(mask)?;
        self.replace_data(data)
    }

    /// Drop rows where `mask` is true.
    pub fn drop_rows(&mut self, mask: &BooleanChunked) -> Result<()> {
        self.keep_rows(&!mask)
    }

    /// Keep rows whose ids, in every sub-column, are in `ids`.
    pub fn keep_ids(&mut self, logical: Logical, ids: &[i64]) -> Result<()> {
        let data = self.filter_ids(logical, ids, true)?;
        self.replace_data(data)
    }

    /// Drop rows where any sub-column holds one of `ids`.
    pub fn drop_ids(&mut self, logical: Logical, ids: &[i64]) -> Result<()> {
        let data = self.filter_ids(logical, ids, false)?;
        self.replace_data(data)
    }

    fn filter_ids(&self, logical: Logical, ids: &[i64], keep: bool) -> Result<DataFrame> {
        if !self.has_column(logical) {
            return Err(BipartiteError::MissingColumn(logical.name().to_string()));
        }
        let ids = Series::new("ids".into(), ids);
        let predicate = self
            .format
            .subcolumns(logical)
            .iter()
            .map(|sub| {
                let found = col(*sub).is_in(lit(ids.clone()), false);
                if keep {
                    found
                } else {
                    found.not()
                }
            })
            .reduce(|acc, e| acc.and(e))
            .unwrap_or_else(|| lit(true));

        Ok(self.data.clone().lazy().filter(predicate).collect()?)
    }

    /// Drop an optional column. Required columns are left in place with a warning.
    pub fn drop_column(&mut self, logical: Logical) -> Result<()> {
        self.detach_column(logical)?;
        Ok(())
    }

    /// Move an optional column out of the schema under a new name.
    ///
    /// Returns the detached sub-columns, named `new_name` (or `new_name1`,
    /// `new_name2` for paired formats). Required columns are left in place
    /// with a warning and `None` is returned.
    pub fn rename_column(&mut self, logical: Logical, new_name: &str) -> Result<Option<DataFrame>> {
        let Some(detached) = self.detach_column(logical)? else {
            return Ok(None);
        };
        let paired = detached.width() > 1 && logical != Logical::T;
        let renamed = detached
            .get_columns()
            .iter()
            .enumerate()
            .map(|(k, c)| {
                let name = if detached.width() == 1 {
                    new_name.to_string()
                } else if paired {
                    format!("{new_name}{}", k + 1)
                } else {
                    format!("{new_name}_{}", c.name())
                };
                c.clone().with_name(name.into())
            })
            .collect::<Vec<_>>();
        Ok(Some(DataFrame::new(renamed)?))
    }

    fn detach_column(&mut self, logical: Logical) -> Result<Option<DataFrame>> {
        if logical.is_required() || logical == Logical::M {
            tracing::warn!(column = %logical, "cannot drop or rename a required column, ignoring");
            return Ok(None);
        }
        if !self.has_column(logical) {
            tracing::warn!(column = %logical, "column not present, ignoring");
            return Ok(None);
        }

        let subcolumns = self.format.subcolumns(logical);
        let detached = self.data.select(subcolumns.iter().copied())?;
        let mut data = self.data.clone();
        for sub in subcolumns {
            data = data.drop(sub)?;
        }

        self.columns.set(logical, false);
        if logical == Logical::G {
            *self.references.slot(Logical::G) = None;
        }
        self.replace_data(data)?;
        Ok(Some(detached))
    }

    /// Single choke point for mutations made outside the cleaning stages.
    fn replace_data(&mut self, mut data: DataFrame) -> Result<()> {
        movers::attach_m(&mut data, self.format)?;
        self.data = data;
        self.invariants = Invariants::unknown(self.columns);
        Ok(())
    }

    /// Install data produced by a pipeline stage; the caller owns the flags.
    pub(crate) fn set_data(&mut self, data: DataFrame) {
        self.data = data;
    }

    /// Copy of the bookkeeping around new data of another format.
    pub(crate) fn with_data(&self, data: DataFrame, format: Format, columns: OptionalColumns) -> Self {
        Self {
            data,
            format,
            columns,
            invariants: self.invariants,
            references: self.references.clone(),
            track_id_changes: self.track_id_changes,
        }
    }

    /// Schema columns in canonical order.
    pub(crate) fn canonical_columns(&self) -> Vec<&'static str> {
        canonical_order(self.format, self.columns)
    }
}
