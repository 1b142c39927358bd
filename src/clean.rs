//! Cleaning orchestrator.

use polars::prelude::*;

use crate::collapse::recollapse;
use crate::convert::pair;
use crate::duplicates::{drop_exact_event, drop_exact_long, resolve_worker_periods};
use crate::error::{BipartiteError, Result};
use crate::frame::BipartiteFrame;
use crate::movers;
use crate::params::CleanParams;
use crate::records::{read_event, read_long, write_event, write_long};
use crate::schema::{ids, Logical};

impl BipartiteFrame {
    /// Run the cleaning pipeline.
    ///
    /// Steps: normalize columns, sort by worker and period, drop missing
    /// values, regenerate `m`, resolve worker-period duplicates, make ids
    /// contiguous, restrict to the requested connected set and make ids
    /// contiguous again where that broke them. A step is skipped when its
    /// invariant already holds, unless `force` is set.
    ///
    /// With `copy` the pipeline runs on a clone and `self` is untouched.
    /// Without it `self` is cleaned in place and a handle to the result is
    /// returned; on error `self` holds whatever state the failing step left.
    pub fn clean(&mut self, params: &CleanParams) -> Result<Self> {
        params.validate()?;
        if params.copy {
            let mut frame = self.clone();
            frame.run_clean(params)?;
            Ok(frame)
        } else {
            self.run_clean(params)?;
            Ok(self.clone())
        }
    }

    fn run_clean(&mut self, params: &CleanParams) -> Result<()> {
        tracing::info!(format = %self.format, rows = self.height(), "checking required columns");
        self.check_columns()?;

        if !params.is_sorted {
            tracing::info!("sorting rows");
            self.sort_rows()?;
        }

        if params.force || !self.invariants.no_na {
            tracing::info!("dropping NaN observations");
            self.drop_missing()?;
            self.invariants.no_na = true;
        }

        tracing::info!("generating m column");
        movers::attach_m(&mut self.data, self.format)?;

        let resolved = self.invariants.no_duplicates && self.invariants.i_t_unique != Some(false);
        if params.force || !resolved {
            tracing::info!(how = %params.i_t_how, "resolving worker-period duplicates");
            self.resolve_duplicates(params)?;
        }

        self.contiguous_where_needed(params.force)?;

        if let Some(mode) = params.connectedness {
            if params.force || self.invariants.connectedness != Some(mode) {
                tracing::info!(mode = %mode, size = %params.component_size, "computing largest connected set");
                self.connected_set(mode, params)?;
                self.contiguous_where_needed(false)?;
            }
        }

        tracing::info!(
            rows = self.height(),
            workers = self.n_workers()?,
            firms = self.n_firms()?,
            "data cleaned"
        );
        Ok(())
    }

    fn contiguous_where_needed(&mut self, force: bool) -> Result<()> {
        for logical in Logical::IDS {
            if !self.has_column(logical) {
                continue;
            }
            if force || self.invariants.contiguous.get(logical) != Some(true) {
                tracing::info!(column = %logical, "making ids contiguous");
                self.contiguous_ids(logical)?;
            }
        }
        Ok(())
    }

    /// Project to schema columns and coerce dtypes.
    ///
    /// Id columns that are not integers are converted to dense integers;
    /// outcomes and weights must be numeric and periods integer.
    fn check_columns(&mut self) -> Result<()> {
        self.data = self.data.select(self.canonical_columns())?;

        for logical in Logical::IDS {
            if !self.has_column(logical) {
                continue;
            }
            let subcolumns = self.format.subcolumns(logical);
            let mut integer = true;
            for sub in subcolumns {
                integer &= self.data.column(sub)?.dtype().is_integer();
            }
            if integer {
                self.cast_columns(subcolumns, DataType::Int64)?;
            } else {
                self.integer_ids(logical)?;
            }
        }

        for logical in [Logical::Y, Logical::W, Logical::T] {
            if !self.has_column(logical) {
                continue;
            }
            let subcolumns = self.format.subcolumns(logical);
            for sub in subcolumns {
                let dtype = self.data.column(sub)?.dtype();
                let (ok, expected) = match logical {
                    Logical::T => (dtype.is_integer(), "an integer type"),
                    _ => (dtype.is_integer() || dtype.is_float(), "a numeric type"),
                };
                if !ok {
                    return Err(BipartiteError::ColumnType {
                        column: sub.to_string(),
                        dtype: dtype.to_string(),
                        expected,
                    });
                }
            }
            let target = if logical == Logical::T {
                DataType::Int64
            } else {
                DataType::Float64
            };
            self.cast_columns(subcolumns, target)?;
        }
        Ok(())
    }

    fn cast_columns(&mut self, subcolumns: &[&str], dtype: DataType) -> Result<()> {
        for sub in subcolumns {
            let column = self.data.column(sub)?;
            if column.dtype() != &dtype {
                let cast = column.cast(&dtype)?;
                self.data.with_column(cast)?;
            }
        }
        Ok(())
    }

    /// Stable sort by worker, then by the first period column when present.
    fn sort_rows(&mut self) -> Result<()> {
        let mut by = vec![ids::I];
        if self.columns.t {
            by.push(self.format.first_period());
        }
        self.data = self
            .data
            .sort(by, SortMultipleOptions::default().with_maintain_order(true))?;
        Ok(())
    }

    /// Drop rows with a null in any column or a NaN in a float column.
    fn drop_missing(&mut self) -> Result<()> {
        let before = self.height();
        let mut data = self.data.drop_nulls::<String>(None)?;

        let mut keep: Option<BooleanChunked> = None;
        for column in data.get_columns() {
            if column.dtype() != &DataType::Float64 {
                continue;
            }
            let not_nan = column.f64()?.is_not_nan();
            keep = Some(match keep {
                Some(keep) => &keep & &not_nan,
                None => not_nan,
            });
        }
        if let Some(keep) = keep {
            data = data.filter(&keep)?;
        }

        let dropped = before - data.height();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped rows with missing values");
            self.rows_removed();
        }
        self.set_data(data);
        Ok(())
    }

    /// Resolve worker-period duplicates, or drop exact duplicates when there
    /// is no period column. Paired formats are resolved on their unpaired rows.
    /// Collapsed spells left next to a spell at the same firm are recollapsed.
    fn resolve_duplicates(&mut self, params: &CleanParams) -> Result<()> {
        let before = self.height();

        if !self.columns.t {
            let data = if self.format.is_event_study() {
                let records = read_event(&self.data, self.format, self.columns)?;
                drop_exact_event(&records)
                    .map(|kept| write_event(&kept, self.format, self.columns))
                    .transpose()?
            } else {
                let records = read_long(&self.data, self.format, self.columns)?;
                drop_exact_long(&records)
                    .map(|kept| write_long(&kept, self.format, self.columns))
                    .transpose()?
            };
            if let Some(data) = data {
                self.set_data(data);
            }
        } else {
            let (records, _) = self.long_records()?;
            if let Some(mut resolved) = resolve_worker_periods(&records, params.i_t_how) {
                tracing::debug!(rows = records.len() - resolved.len(), "merged duplicate worker-periods");
                if self.format.is_collapsed() {
                    resolved = recollapse(&resolved, params.drop_multiples);
                }
                let data = if self.format.is_event_study() {
                    write_event(&pair(&resolved), self.format, self.columns)?
                } else {
                    write_long(&resolved, self.format, self.columns)?
                };
                self.set_data(data);
            }
            self.invariants.i_t_unique = Some(true);
        }

        if self.height() != before {
            self.rows_removed();
        }
        self.invariants.no_duplicates = true;
        Ok(())
    }

    /// Rows vanished inside the pipeline: ids may have gaps and the
    /// connected set is stale.
    fn rows_removed(&mut self) {
        for logical in Logical::IDS {
            if self.has_column(logical) {
                self.invariants.contiguous.set(logical, false);
            }
        }
        self.invariants.connectedness = None;
    }
}
