//! Connectivity engine.
//!
//! Restricts a frame to the largest set of firms that is connected,
//! leave-one-observation-out connected, or leave-one-firm-out connected.
//! Single-slot data is searched as spells that remember the table rows
//! behind them; paired data is searched row by row for plain connectivity
//! and through its single-slot counterpart otherwise.

use std::collections::{BTreeSet, HashMap, HashSet};

use polars::prelude::*;

use crate::collapse::{recollapse, runs};
use crate::convert::worker_blocks;
use crate::error::{BipartiteError, Result};
use crate::frame::BipartiteFrame;
use crate::graph::{FirmGraph, ObservationGraph};
use crate::movers;
use crate::params::{CleanParams, ComponentSize, Connectedness};
use crate::records::{read_event, read_long, write_long, EventRecord, LongRecord};
use crate::schema::Logical;

/// A worker's stay at one firm and the table rows it stands for.
#[derive(Debug, Clone)]
struct Spell {
    i: i64,
    j: i64,
    rows: Vec<usize>,
}

fn spells_from(records: &[LongRecord]) -> Vec<Spell> {
    runs(records)
        .into_iter()
        .map(|run| Spell {
            i: records[run.start].i,
            j: records[run.start].slot.j,
            rows: run.collect(),
        })
        .collect()
}

/// Merge neighbouring spells of one worker at one firm, or drop them.
fn merge_adjacent(spells: Vec<Spell>, drop_multiples: bool) -> Vec<Spell> {
    let mut out: Vec<Spell> = Vec::with_capacity(spells.len());
    let mut run = 1;
    for spell in spells {
        match out.last_mut() {
            Some(last) if last.i == spell.i && last.j == spell.j => {
                last.rows.extend(spell.rows);
                run += 1;
            }
            _ => {
                if drop_multiples && run > 1 {
                    out.pop();
                }
                run = 1;
                out.push(spell);
            }
        }
    }
    if drop_multiples && run > 1 {
        out.pop();
    }
    out
}

fn restrict(spells: &[Spell], firms: &[i64]) -> Vec<Spell> {
    let firms: HashSet<i64> = firms.iter().copied().collect();
    spells
        .iter()
        .filter(|s| firms.contains(&s.j))
        .cloned()
        .collect()
}

/// Firm graph over spells: consecutive spells of a worker are linked, and
/// with `secondary` so are spells two apart.
fn firm_graph(spells: &[Spell], secondary: bool) -> FirmGraph {
    let firms: BTreeSet<i64> = spells.iter().map(|s| s.j).collect();
    let mut graph = FirmGraph::new(firms);
    for block in worker_blocks(spells, |s| s.i) {
        for pair in block.windows(2) {
            graph.add_link(pair[0].j, pair[1].j);
        }
        if secondary {
            for triple in block.windows(3) {
                graph.add_link(triple[0].j, triple[2].j);
            }
        }
    }
    graph
}

/// Size of a candidate under the chosen metric.
fn metric(spells: &[Spell], size: ComponentSize) -> usize {
    match size {
        ComponentSize::Rows => spells.iter().map(|s| s.rows.len()).sum(),
        ComponentSize::Firms => spells.iter().map(|s| s.j).collect::<HashSet<_>>().len(),
        ComponentSize::Workers => spells.iter().map(|s| s.i).collect::<HashSet<_>>().len(),
        ComponentSize::Stayers | ComponentSize::Movers => {
            let mut firms: HashMap<i64, HashSet<i64>> = HashMap::new();
            for s in spells {
                firms.entry(s.i).or_default().insert(s.j);
            }
            let movers = firms.values().filter(|f| f.len() > 1).count();
            if size == ComponentSize::Movers {
                movers
            } else {
                firms.len() - movers
            }
        }
    }
}

/// Keeps the best candidate seen so far. Later candidates win ties.
struct Best<T> {
    size: ComponentSize,
    current: Option<(usize, T)>,
}

impl<T> Best<T> {
    fn new(size: ComponentSize) -> Self {
        Self {
            size,
            current: None,
        }
    }

    fn offer(&mut self, value: usize, candidate: T) {
        if self.current.as_ref().map_or(true, |(best, _)| value >= *best) {
            self.current = Some((value, candidate));
        }
    }

    fn into_inner(self) -> Option<T> {
        self.current.map(|(_, c)| c)
    }
}

fn largest_connected(spells: &[Spell], size: ComponentSize) -> Vec<Spell> {
    let mut components = firm_graph(spells, false).connected_components();
    components.sort_by(|a, b| b.len().cmp(&a.len()));
    tracing::debug!(components = components.len(), "connected components");

    let mut best = Best::new(size);
    for firms in components {
        let candidate = restrict(spells, &firms);
        best.offer(metric(&candidate, best.size), candidate);
    }
    best.into_inner().unwrap_or_default()
}

fn largest_biconnected(spells: &[Spell], size: ComponentSize) -> Vec<Spell> {
    let components = firm_graph(spells, true).biconnected_components();
    tracing::debug!(components = components.len(), "biconnected components");

    let mut best = Best::new(size);
    for firms in components {
        let candidate = restrict(spells, &firms);
        best.offer(metric(&candidate, best.size), candidate);
    }
    best.into_inner().unwrap_or_default()
}

/// Mover spells whose removal would disconnect the candidate, as indices
/// into `spells`.
fn articulation_spells(spells: &[Spell]) -> Vec<usize> {
    let mut firms: HashMap<i64, HashSet<i64>> = HashMap::new();
    for s in spells {
        firms.entry(s.i).or_default().insert(s.j);
    }

    let mut graph = ObservationGraph::new();
    for (k, s) in spells.iter().enumerate() {
        if firms.get(&s.i).is_some_and(|f| f.len() > 1) {
            graph.add_observation(k, s.i, s.j);
        }
    }
    graph.bridges()
}

fn largest_leave_one_observation_out(
    spells: &[Spell],
    size: ComponentSize,
    drop_multiples: bool,
) -> Vec<Spell> {
    let split = |spells: &[Spell], stack: &mut Vec<Vec<Spell>>| {
        let components = firm_graph(spells, false).connected_components();
        for firms in components.iter().rev() {
            stack.push(merge_adjacent(restrict(spells, firms), drop_multiples));
        }
    };

    let mut stack: Vec<Vec<Spell>> = Vec::new();
    split(spells, &mut stack);

    let mut best = Best::new(size);
    while let Some(candidate) = stack.pop() {
        let bridges = articulation_spells(&candidate);
        if bridges.is_empty() {
            best.offer(metric(&candidate, best.size), candidate);
            continue;
        }

        tracing::debug!(bridges = bridges.len(), "dropping articulation observations");
        let bridges: HashSet<usize> = bridges.into_iter().collect();
        let remaining: Vec<Spell> = candidate
            .into_iter()
            .enumerate()
            .filter(|(k, _)| !bridges.contains(k))
            .map(|(_, s)| s)
            .collect();
        let remaining = merge_adjacent(remaining, drop_multiples);
        split(&remaining, &mut stack);
    }
    best.into_inner().unwrap_or_default()
}

/// Row mask for plain connectivity on paired rows.
fn connected_event_rows(records: &[EventRecord], size: ComponentSize) -> Vec<bool> {
    let firms: BTreeSet<i64> = records.iter().flat_map(|r| [r.pre.j, r.post.j]).collect();
    let mut graph = FirmGraph::new(firms);
    for r in records {
        graph.add_link(r.pre.j, r.post.j);
    }
    let mut components = graph.connected_components();
    components.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut best = Best::new(size);
    for firms in components {
        let firms: HashSet<i64> = firms.into_iter().collect();
        let mask: Vec<bool> = records.iter().map(|r| firms.contains(&r.pre.j)).collect();
        let rows: Vec<&EventRecord> = records
            .iter()
            .zip(&mask)
            .filter_map(|(r, keep)| keep.then_some(r))
            .collect();

        let value = match best.size {
            ComponentSize::Rows => rows.len(),
            ComponentSize::Firms => firms.len(),
            ComponentSize::Workers => rows.iter().map(|r| r.i).collect::<HashSet<_>>().len(),
            ComponentSize::Stayers | ComponentSize::Movers => {
                let workers: HashSet<i64> = rows.iter().map(|r| r.i).collect();
                let movers: HashSet<i64> =
                    rows.iter().filter(|r| r.is_move()).map(|r| r.i).collect();
                if best.size == ComponentSize::Movers {
                    movers.len()
                } else {
                    workers.len() - movers.len()
                }
            }
        };
        best.offer(value, mask);
    }
    best.into_inner()
        .unwrap_or_else(|| vec![false; records.len()])
}

impl BipartiteFrame {
    /// Restrict the frame to the largest firm set satisfying `mode`.
    ///
    /// Collapsed formats, or any format when `fixed_point.force_loop` is set,
    /// repeat the pass until the row count is stable. Exceeding
    /// `fixed_point.max_iterations` is an error and leaves the last
    /// intermediate state in the frame.
    pub fn connected_set(&mut self, mode: Connectedness, params: &CleanParams) -> Result<()> {
        if self.format.is_event_study() && mode != Connectedness::Connected {
            tracing::warn!(
                format = %self.format,
                mode = %mode,
                "leave-one-out connectivity on event-study data converts through the long format"
            );
            let mut long = self.to_format(self.format.long_counterpart())?;
            long.connected_set(mode, params)?;
            *self = long.to_format(self.format)?;
            return Ok(());
        }

        let before = self.id_counts()?;
        let looping = self.format.is_collapsed() || params.fixed_point.force_loop;
        let mut iterations = 0;
        loop {
            let rows = self.height();
            self.connectivity_pass(mode, params)?;
            iterations += 1;
            tracing::debug!(iteration = iterations, rows_before = rows, rows_after = self.height(), "connectivity pass");

            if !looping || self.height() == rows {
                break;
            }
            if iterations >= params.fixed_point.max_iterations {
                tracing::error!(iterations, rows = self.height(), "connectivity did not reach a fixed point");
                return Err(BipartiteError::FixedPointNonConvergence {
                    iterations,
                    rows: self.height(),
                });
            }
        }

        let after = self.id_counts()?;
        for ((logical, n_before), (_, n_after)) in before.into_iter().zip(after) {
            if n_before != n_after {
                self.invariants.contiguous.set(logical, false);
            }
        }
        self.invariants.connectedness = Some(mode);
        Ok(())
    }

    fn id_counts(&self) -> Result<Vec<(Logical, usize)>> {
        Logical::IDS
            .into_iter()
            .filter(|l| self.has_column(*l))
            .map(|l| Ok((l, self.n_unique_ids(l)?)))
            .collect()
    }

    fn connectivity_pass(&mut self, mode: Connectedness, params: &CleanParams) -> Result<()> {
        let size = params.component_size;
        let keep = if self.format.is_event_study() {
            connected_event_rows(&read_event(&self.data, self.format, self.columns)?, size)
        } else {
            let records = read_long(&self.data, self.format, self.columns)?;
            let spells = spells_from(&records);
            let drop_multiples = params.drop_multiples && self.format.is_collapsed();
            let survivors = match mode {
                Connectedness::Connected => largest_connected(&spells, size),
                Connectedness::LeaveOneObservationOut => {
                    largest_leave_one_observation_out(&spells, size, drop_multiples)
                }
                Connectedness::LeaveOneFirmOut => largest_biconnected(&spells, size),
            };
            let mut keep = vec![false; records.len()];
            for row in survivors.iter().flat_map(|s| &s.rows) {
                keep[*row] = true;
            }
            keep
        };

        let dropped = keep.iter().filter(|k| !**k).count();
        let mut data = if dropped > 0 {
            tracing::debug!(dropped, "dropping rows outside the connected set");
            self.data.filter(&BooleanChunked::from_slice("keep".into(), &keep))?
        } else {
            self.data.clone()
        };

        if self.format.is_collapsed() && !self.format.is_event_study() {
            let records = read_long(&data, self.format, self.columns)?;
            let merged = recollapse(&records, params.drop_multiples);
            if merged.len() != records.len() || dropped > 0 {
                data = write_long(&merged, self.format, self.columns)?;
            }
        } else if dropped > 0 {
            movers::attach_m(&mut data, self.format)?;
        }
        self.set_data(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spell(i: i64, j: i64, row: usize) -> Spell {
        Spell {
            i,
            j,
            rows: vec![row],
        }
    }

    fn firms(spells: &[Spell]) -> Vec<i64> {
        spells
            .iter()
            .map(|s| s.j)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[test]
    fn merge_adjacent_unions_rows() {
        let merged = merge_adjacent(vec![spell(0, 1, 0), spell(0, 1, 1), spell(0, 2, 2)], false);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].rows, vec![0, 1]);

        let dropped = merge_adjacent(vec![spell(0, 1, 0), spell(0, 1, 1), spell(0, 2, 2)], true);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].j, 2);
    }

    #[test]
    fn metric_counts_stayers_and_movers() {
        let spells = vec![spell(0, 1, 0), spell(0, 2, 1), spell(1, 2, 2), spell(2, 3, 3)];
        assert_eq!(metric(&spells, ComponentSize::Movers), 1);
        assert_eq!(metric(&spells, ComponentSize::Stayers), 2);
        assert_eq!(metric(&spells, ComponentSize::Rows), 4);
        assert_eq!(metric(&spells, ComponentSize::Firms), 3);
    }

    #[test]
    fn equal_components_prefer_the_later_one() {
        // Two two-firm components of equal size.
        let spells = vec![spell(0, 0, 0), spell(0, 1, 1), spell(1, 2, 2), spell(1, 3, 3)];
        assert_eq!(firms(&largest_connected(&spells, ComponentSize::Firms)), vec![2, 3]);
    }

    #[test]
    fn leave_one_observation_out_drops_single_link_firms() {
        // Firms 0 and 1 are linked by two movers; firm 2 hangs on one observation.
        let spells = vec![
            spell(0, 0, 0),
            spell(0, 1, 1),
            spell(1, 1, 2),
            spell(1, 0, 3),
            spell(2, 1, 4),
            spell(2, 2, 5),
        ];
        let kept = largest_leave_one_observation_out(&spells, ComponentSize::Firms, false);
        assert_eq!(firms(&kept), vec![0, 1]);
        // Both of worker 2's observations were bridges.
        assert!(kept.iter().all(|s| s.i != 2));
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn leave_one_firm_out_uses_secondary_links() {
        // Worker 0 visits 0 -> 1 -> 2, which links 0 and 2 through the secondary edge.
        let spells = vec![spell(0, 0, 0), spell(0, 1, 1), spell(0, 2, 2), spell(1, 3, 3)];
        assert_eq!(firms(&largest_biconnected(&spells, ComponentSize::Firms)), vec![0, 1, 2]);
    }
}
