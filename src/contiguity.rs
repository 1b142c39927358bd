//! Identifier contiguity engine.
//!
//! Renumbers an id column (pooled over its sub-columns) to `0..n` and, when
//! tracking is on, appends a layer to the column's reference chain.

use std::collections::HashMap;
use std::hash::Hash;

use polars::prelude::*;

use crate::error::Result;
use crate::frame::BipartiteFrame;
use crate::records::int_values;
use crate::schema::{reference, Logical};

/// An original identifier value as it appeared in the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginalId {
    Int(i64),
    Str(String),
}

/// Chain of id mappings for one column.
///
/// The table has an `original_ids` column followed by one `adjusted_ids_k`
/// column per contiguity pass. Ids dropped before a pass hold null in that
/// pass's column and every later one.
#[derive(Debug, Clone)]
pub struct IdReference {
    table: DataFrame,
}

impl IdReference {
    fn first(original: Column, adjusted: Vec<i64>) -> Result<Self> {
        let table = DataFrame::new(vec![
            original.with_name(reference::ORIGINAL_IDS.into()),
            Column::new(adjusted_name(1).into(), adjusted),
        ])?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &DataFrame {
        &self.table
    }

    /// Number of contiguity passes recorded.
    pub fn layers(&self) -> usize {
        self.table.width() - 1
    }

    fn latest(&self) -> String {
        adjusted_name(self.layers())
    }

    fn push_layer(&mut self, old: Vec<i64>, new: Vec<i64>) -> Result<()> {
        let latest = self.latest();
        let layer = DataFrame::new(vec![
            Column::new(latest.as_str().into(), old),
            Column::new(adjusted_name(self.layers() + 1).into(), new),
        ])?;

        self.table = self
            .table
            .clone()
            .lazy()
            .join(
                layer.lazy(),
                [col(latest.as_str())],
                [col(latest.as_str())],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        Ok(())
    }

    /// The raw value behind a current dense id.
    pub fn original_of(&self, id: i64) -> Result<Option<OriginalId>> {
        let latest = self.table.column(&self.latest())?.i64()?;
        let Some(row) = latest.into_iter().position(|v| v == Some(id)) else {
            return Ok(None);
        };

        let original = self.table.column(reference::ORIGINAL_IDS)?;
        let value = match original.dtype() {
            DataType::String => original.str()?.get(row).map(|s| OriginalId::Str(s.to_string())),
            _ => original
                .cast(&DataType::Int64)?
                .i64()?
                .get(row)
                .map(OriginalId::Int),
        };
        Ok(value)
    }

    /// Lookup from current id (`key`) to original value (`value`).
    fn lookup(&self, key: &str, value: &str) -> Result<DataFrame> {
        let latest = self.latest();
        Ok(self
            .table
            .clone()
            .lazy()
            .filter(col(latest.as_str()).is_not_null())
            .select([
                col(latest.as_str()).alias(key),
                col(reference::ORIGINAL_IDS).alias(value),
            ])
            .collect()?)
    }
}

fn adjusted_name(layer: usize) -> String {
    format!("{}{layer}", reference::ADJUSTED_PREFIX)
}

/// Reference chains for the id columns of a frame.
#[derive(Debug, Clone, Default)]
pub struct IdReferences {
    i: Option<IdReference>,
    j: Option<IdReference>,
    g: Option<IdReference>,
}

impl IdReferences {
    pub fn get(&self, logical: Logical) -> Option<&IdReference> {
        match logical {
            Logical::I => self.i.as_ref(),
            Logical::J => self.j.as_ref(),
            Logical::G => self.g.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn slot(&mut self, logical: Logical) -> &mut Option<IdReference> {
        match logical {
            Logical::I => &mut self.i,
            Logical::J => &mut self.j,
            _ => &mut self.g,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.i.is_none() && self.j.is_none() && self.g.is_none()
    }
}

/// Dense codes in order of first appearance, row-major over the pooled
/// sub-columns. Nulls stay null.
fn factorize<K: Hash + Eq + Clone>(pool: &[Vec<Option<K>>]) -> (Vec<Vec<Option<i64>>>, Vec<K>) {
    let n = pool.first().map_or(0, Vec::len);
    let mut codes: HashMap<K, i64> = HashMap::new();
    let mut uniques: Vec<K> = Vec::new();
    let mut out: Vec<Vec<Option<i64>>> = pool.iter().map(|_| Vec::with_capacity(n)).collect();

    for r in 0..n {
        for (c, column) in pool.iter().enumerate() {
            let code = column[r].as_ref().map(|v| {
                *codes.entry(v.clone()).or_insert_with(|| {
                    uniques.push(v.clone());
                    uniques.len() as i64 - 1
                })
            });
            out[c].push(code);
        }
    }
    (out, uniques)
}

/// True when the non-null values are exactly `0..n_unique`.
fn is_contiguous(pool: &[Vec<Option<i64>>]) -> bool {
    let mut seen = std::collections::HashSet::new();
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for v in pool.iter().flatten().flatten() {
        seen.insert(*v);
        min = min.min(*v);
        max = max.max(*v);
    }
    seen.is_empty() || (min == 0 && max + 1 == seen.len() as i64)
}

impl BipartiteFrame {
    /// Make an integer id column contiguous.
    pub(crate) fn contiguous_ids(&mut self, logical: Logical) -> Result<()> {
        let subcolumns = self.format.subcolumns(logical);
        let pool = subcolumns
            .iter()
            .map(|sub| int_values(&self.data, sub))
            .collect::<Result<Vec<_>>>()?;

        if is_contiguous(&pool) {
            if self.track_id_changes && self.references.get(logical).is_none() {
                // Seed the chain with the identity so originals stay recoverable.
                let ids = self.unique_ids(logical)?;
                let reference = IdReference::first(Column::new("ids".into(), &ids), ids)?;
                *self.references.slot(logical) = Some(reference);
            }
            self.invariants.contiguous.set(logical, true);
            return Ok(());
        }

        let (codes, uniques) = factorize(&pool);
        tracing::debug!(column = %logical, ids = uniques.len(), "renumbering ids");
        self.write_codes(subcolumns, codes)?;

        if self.track_id_changes {
            let adjusted: Vec<i64> = (0..uniques.len() as i64).collect();
            match self.references.slot(logical) {
                Some(chain) => chain.push_layer(uniques, adjusted)?,
                slot => {
                    *slot = Some(IdReference::first(
                        Column::new("ids".into(), &uniques),
                        adjusted,
                    )?)
                }
            }
        }
        self.invariants.contiguous.set(logical, true);
        Ok(())
    }

    /// Replace a non-integer id column (e.g. string ids) with dense integers.
    pub(crate) fn integer_ids(&mut self, logical: Logical) -> Result<()> {
        let subcolumns = self.format.subcolumns(logical);
        let pool = subcolumns
            .iter()
            .map(|sub| -> Result<Vec<Option<String>>> {
                let column = self.data.column(sub)?.cast(&DataType::String)?;
                Ok(column
                    .str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect())
            })
            .collect::<Result<Vec<_>>>()?;

        let (codes, uniques) = factorize(&pool);
        tracing::info!(column = %logical, ids = uniques.len(), "converting ids to integers");
        self.write_codes(subcolumns, codes)?;

        if self.track_id_changes {
            let adjusted: Vec<i64> = (0..uniques.len() as i64).collect();
            *self.references.slot(logical) = Some(IdReference::first(
                Column::new("ids".into(), uniques),
                adjusted,
            )?);
        }
        self.invariants.contiguous.set(logical, true);
        Ok(())
    }

    fn write_codes(&mut self, subcolumns: &[&str], codes: Vec<Vec<Option<i64>>>) -> Result<()> {
        for (sub, codes) in subcolumns.iter().zip(codes) {
            self.data.with_column(Column::new((*sub).into(), codes))?;
        }
        Ok(())
    }

    /// The data with an `original_<column>` column next to every tracked id
    /// sub-column. Warns and returns `None` when nothing is tracked.
    pub fn original_ids(&self) -> Result<Option<DataFrame>> {
        if self.references.is_empty() {
            tracing::warn!("no id reference chain recorded, enable id tracking before cleaning");
            return Ok(None);
        }

        let row = "__row";
        let mut out = self.data.with_row_index(row.into(), None)?.lazy();
        for logical in Logical::IDS {
            let Some(chain) = self.references.get(logical) else {
                continue;
            };
            if !self.has_column(logical) {
                continue;
            }
            for sub in self.format.subcolumns(logical) {
                let lookup = chain.lookup(sub, &format!("{}{sub}", reference::ORIGINAL_PREFIX))?;
                out = out.join(
                    lookup.lazy(),
                    [col(*sub)],
                    [col(*sub)],
                    JoinArgs::new(JoinType::Left),
                );
            }
        }

        let out = out
            .sort([row], SortMultipleOptions::default())
            .collect()?
            .drop(row)?;
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factorize_follows_first_appearance_row_major() {
        let pool = vec![
            vec![Some(5_i64), Some(3)],
            vec![Some(3_i64), Some(9)],
        ];
        let (codes, uniques) = factorize(&pool);
        assert_eq!(uniques, vec![5, 3, 9]);
        assert_eq!(codes[0], vec![Some(0), Some(1)]);
        assert_eq!(codes[1], vec![Some(1), Some(2)]);
    }

    #[test]
    fn nulls_are_not_assigned_codes() {
        let pool = vec![vec![Some(7_i64), None, Some(7)]];
        let (codes, uniques) = factorize(&pool);
        assert_eq!(uniques, vec![7]);
        assert_eq!(codes[0], vec![Some(0), None, Some(0)]);
    }

    #[test]
    fn contiguity_check_requires_zero_based_range() {
        assert!(is_contiguous(&[vec![Some(1), Some(0), Some(2)]]));
        assert!(!is_contiguous(&[vec![Some(1), Some(2)]]));
        assert!(!is_contiguous(&[vec![Some(0), Some(1), Some(3)]]));
        assert!(is_contiguous(&[vec![]]));
    }

    #[test]
    fn chain_layers_compose() -> Result<()> {
        let mut chain = IdReference::first(Column::new("ids".into(), &[10_i64, 30, 40]), vec![0, 1, 2])?;
        // Pass two dropped id 0 and renumbered 1 -> 0, 2 -> 1.
        chain.push_layer(vec![1, 2], vec![0, 1])?;

        assert_eq!(chain.layers(), 2);
        assert_eq!(chain.original_of(0)?, Some(OriginalId::Int(30)));
        assert_eq!(chain.original_of(1)?, Some(OriginalId::Int(40)));
        assert_eq!(chain.original_of(2)?, None);
        Ok(())
    }
}
