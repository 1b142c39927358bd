//! Typed row views over panel tables.
//!
//! Row-wise stages (spells, pairing, duplicate resolution) read the table
//! into records, work on plain vectors, and write a fresh table back. The
//! mover flag is never stored on a record; writers recompute it.

use polars::prelude::*;

use crate::error::{BipartiteError, Result};
use crate::format::Format;
use crate::movers;
use crate::schema::Logical;

/// Optional logical columns present in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionalColumns {
    pub t: bool,
    pub g: bool,
    pub w: bool,
}

impl OptionalColumns {
    pub fn contains(&self, logical: Logical) -> bool {
        match logical {
            Logical::T => self.t,
            Logical::G => self.g,
            Logical::W => self.w,
            Logical::I | Logical::J | Logical::Y | Logical::M => true,
        }
    }

    pub(crate) fn set(&mut self, logical: Logical, present: bool) {
        match logical {
            Logical::T => self.t = present,
            Logical::G => self.g = present,
            Logical::W => self.w = present,
            Logical::I | Logical::J | Logical::Y | Logical::M => {}
        }
    }
}

/// First and last period covered by an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub first: i64,
    pub last: i64,
}

impl Span {
    pub fn point(t: i64) -> Self {
        Self { first: t, last: t }
    }

    pub fn periods(&self) -> i64 {
        self.last - self.first + 1
    }
}

/// One firm observation: a period row or a spell.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub j: i64,
    pub y: f64,
    pub t: Option<Span>,
    pub g: Option<i64>,
    pub w: Option<f64>,
}

impl Slot {
    /// Weight used when averaging outcomes; unweighted rows count once.
    pub fn weight(&self) -> f64 {
        self.w.unwrap_or(1.0)
    }

    fn key(&self) -> (i64, u64, Option<(i64, i64)>, Option<i64>, Option<u64>) {
        (
            self.j,
            self.y.to_bits(),
            self.t.map(|s| (s.first, s.last)),
            self.g,
            self.w.map(f64::to_bits),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub i: i64,
    pub slot: Slot,
}

impl LongRecord {
    pub(crate) fn key(&self) -> impl Eq + std::hash::Hash {
        (self.i, self.slot.key())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub i: i64,
    pub pre: Slot,
    pub post: Slot,
}

impl EventRecord {
    pub fn is_move(&self) -> bool {
        self.pre.j != self.post.j
    }

    pub(crate) fn key(&self) -> impl Eq + std::hash::Hash {
        (self.i, self.pre.key(), self.post.key())
    }
}

// ── Column access ───────────────────────────────────────────────────────────

pub(crate) fn int_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

pub(crate) fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn non_null<T: Copy>(values: &[Option<T>], name: &str) -> Result<Vec<T>> {
    values
        .iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                BipartiteError::InvalidData(format!("Null value in column '{name}' at row {row}"))
            })
        })
        .collect()
}

fn required_ints(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    non_null(&int_values(df, name)?, name)
}

fn required_floats(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    non_null(&float_values(df, name)?, name)
}

fn optional_ints(df: &DataFrame, name: &str, present: bool) -> Result<Vec<Option<i64>>> {
    if present {
        int_values(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

fn optional_floats(df: &DataFrame, name: &str, present: bool) -> Result<Vec<Option<f64>>> {
    if present {
        float_values(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

/// Spans for one slot of a format's period columns.
fn spans(df: &DataFrame, format: Format, slot: usize, present: bool) -> Result<Vec<Option<Span>>> {
    if !present {
        return Ok(vec![None; df.height()]);
    }
    let names = format.subcolumns(Logical::T);
    let spans = match format {
        Format::Long => required_ints(df, names[0])?
            .into_iter()
            .map(|t| Some(Span::point(t)))
            .collect(),
        Format::EventStudy => required_ints(df, names[slot])?
            .into_iter()
            .map(|t| Some(Span::point(t)))
            .collect(),
        Format::CollapsedLong | Format::CollapsedEventStudy => {
            let first = required_ints(df, names[2 * slot])?;
            let last = required_ints(df, names[2 * slot + 1])?;
            first
                .into_iter()
                .zip(last)
                .map(|(first, last)| Some(Span { first, last }))
                .collect()
        }
    };
    Ok(spans)
}

fn slots(df: &DataFrame, format: Format, columns: OptionalColumns, slot: usize) -> Result<Vec<Slot>> {
    let j = required_ints(df, format.subcolumns(Logical::J)[slot])?;
    let y = required_floats(df, format.subcolumns(Logical::Y)[slot])?;
    let t = spans(df, format, slot, columns.t)?;
    let g = optional_ints(df, format.subcolumns(Logical::G)[slot], columns.g)?;
    let w = optional_floats(df, format.subcolumns(Logical::W)[slot], columns.w)?;

    Ok((0..df.height())
        .map(|r| Slot {
            j: j[r],
            y: y[r],
            t: t[r],
            g: g[r],
            w: w[r],
        })
        .collect())
}

// ── Reading ─────────────────────────────────────────────────────────────────

pub fn read_long(df: &DataFrame, format: Format, columns: OptionalColumns) -> Result<Vec<LongRecord>> {
    debug_assert!(!format.is_event_study());
    let i = required_ints(df, Logical::I.name())?;
    let slots = slots(df, format, columns, 0)?;
    Ok(i.into_iter()
        .zip(slots)
        .map(|(i, slot)| LongRecord { i, slot })
        .collect())
}

pub fn read_event(df: &DataFrame, format: Format, columns: OptionalColumns) -> Result<Vec<EventRecord>> {
    debug_assert!(format.is_event_study());
    let i = required_ints(df, Logical::I.name())?;
    let pre = slots(df, format, columns, 0)?;
    let post = slots(df, format, columns, 1)?;
    Ok(i.into_iter()
        .zip(pre.into_iter().zip(post))
        .map(|(i, (pre, post))| EventRecord { i, pre, post })
        .collect())
}

// ── Writing ─────────────────────────────────────────────────────────────────

/// Columns for one slot, in canonical order.
fn slot_columns(
    slots: &[&Slot],
    format: Format,
    columns: OptionalColumns,
    slot: usize,
) -> Vec<(Logical, Vec<Column>)> {
    let name = |logical: Logical| format.subcolumns(logical)[slot];

    let mut out = vec![
        (
            Logical::J,
            vec![Column::new(
                name(Logical::J).into(),
                slots.iter().map(|s| s.j).collect::<Vec<_>>(),
            )],
        ),
        (
            Logical::Y,
            vec![Column::new(
                name(Logical::Y).into(),
                slots.iter().map(|s| s.y).collect::<Vec<_>>(),
            )],
        ),
    ];

    if columns.t {
        let names = format.subcolumns(Logical::T);
        let t = match format {
            Format::Long => vec![Column::new(
                names[0].into(),
                slots.iter().map(|s| s.t.map(|t| t.first)).collect::<Vec<_>>(),
            )],
            Format::EventStudy => vec![Column::new(
                names[slot].into(),
                slots.iter().map(|s| s.t.map(|t| t.first)).collect::<Vec<_>>(),
            )],
            Format::CollapsedLong | Format::CollapsedEventStudy => vec![
                Column::new(
                    names[2 * slot].into(),
                    slots.iter().map(|s| s.t.map(|t| t.first)).collect::<Vec<_>>(),
                ),
                Column::new(
                    names[2 * slot + 1].into(),
                    slots.iter().map(|s| s.t.map(|t| t.last)).collect::<Vec<_>>(),
                ),
            ],
        };
        out.push((Logical::T, t));
    }
    if columns.g {
        out.push((
            Logical::G,
            vec![Column::new(
                name(Logical::G).into(),
                slots.iter().map(|s| s.g).collect::<Vec<_>>(),
            )],
        ));
    }
    if columns.w {
        out.push((
            Logical::W,
            vec![Column::new(
                name(Logical::W).into(),
                slots.iter().map(|s| s.w).collect::<Vec<_>>(),
            )],
        ));
    }
    out
}

pub fn write_long(records: &[LongRecord], format: Format, columns: OptionalColumns) -> Result<DataFrame> {
    debug_assert!(!format.is_event_study());
    let slots: Vec<&Slot> = records.iter().map(|r| &r.slot).collect();

    let mut out = vec![Column::new(
        Logical::I.name().into(),
        records.iter().map(|r| r.i).collect::<Vec<_>>(),
    )];
    out.extend(
        slot_columns(&slots, format, columns, 0)
            .into_iter()
            .flat_map(|(_, cols)| cols),
    );

    let mut df = DataFrame::new(out)?;
    movers::attach_m(&mut df, format)?;
    Ok(df)
}

pub fn write_event(records: &[EventRecord], format: Format, columns: OptionalColumns) -> Result<DataFrame> {
    debug_assert!(format.is_event_study());
    let pre: Vec<&Slot> = records.iter().map(|r| &r.pre).collect();
    let post: Vec<&Slot> = records.iter().map(|r| &r.post).collect();
    let pre = slot_columns(&pre, format, columns, 0);
    let post = slot_columns(&post, format, columns, 1);

    let mut out = vec![Column::new(
        Logical::I.name().into(),
        records.iter().map(|r| r.i).collect::<Vec<_>>(),
    )];
    for ((_, first), (_, second)) in pre.into_iter().zip(post) {
        out.extend(first);
        out.extend(second);
    }

    let mut df = DataFrame::new(out)?;
    movers::attach_m(&mut df, format)?;
    Ok(df.select(canonical_order(format, columns))?)
}

/// Canonical column order for a format: logical order, slot order within each.
pub fn canonical_order(format: Format, columns: OptionalColumns) -> Vec<&'static str> {
    Logical::ALL
        .iter()
        .filter(|l| columns.contains(**l))
        .flat_map(|l| format.subcolumns(*l).iter().copied())
        .collect()
}
