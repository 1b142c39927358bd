use std::collections::BTreeSet;

use anyhow::Result;
use bipartite_panel::graph::FirmGraph;
use bipartite_panel::{
    BipartiteError, BipartiteFrame, CleanParams, ComponentSize, Connectedness, FixedPointPolicy,
    Format, Logical,
};
use polars::prelude::*;

fn ints(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    Ok(df.column(name)?.i64()?.into_no_null_iter().collect())
}

fn floats(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(df.column(name)?.f64()?.into_no_null_iter().collect())
}

fn mode(connectedness: Connectedness) -> CleanParams {
    CleanParams::default().with_connectedness(Some(connectedness))
}

/// True when consecutive rows of each worker link every firm present.
fn firms_connected(df: &DataFrame) -> Result<bool> {
    let i = ints(df, "i")?;
    let j = ints(df, "j")?;
    let firms: BTreeSet<i64> = j.iter().copied().collect();
    let mut graph = FirmGraph::new(firms);
    for r in 1..i.len() {
        if i[r] == i[r - 1] {
            graph.add_link(j[r - 1], j[r]);
        }
    }
    Ok(graph.connected_components().len() <= 1)
}

/// Firms 0-3 are tied together by several movers. Firm 4 hangs off firm 1
/// through worker 4 alone, and firm 5 sits between firms 2 and 3.
fn web() -> Result<DataFrame> {
    Ok(df!(
        "i" => [0_i64, 0, 0, 1, 1, 2, 2, 2, 3, 3, 4, 4, 5, 5, 5, 6, 6],
        "j" => [0_i64, 1, 2, 1, 3, 2, 0, 3, 3, 0, 1, 4, 2, 5, 3, 1, 2],
        "y" => [1.0; 17],
        "t" => [1_i64, 2, 3, 1, 2, 1, 2, 3, 1, 2, 1, 2, 1, 2, 3, 1, 2],
    )?)
}

/// Firms 0 and 1 are linked by two movers; worker 2 alone links firm 2.
fn single_link() -> Result<DataFrame> {
    Ok(df!(
        "i" => [0_i64, 0, 1, 1, 2, 2],
        "j" => [0_i64, 1, 1, 0, 1, 2],
        "y" => [1.0, 2.0, 2.0, 1.0, 2.0, 3.0],
        "t" => [1_i64, 2, 1, 2, 1, 2],
    )?)
}

#[test]
fn connected_keeps_a_single_link() -> Result<()> {
    let mut frame = BipartiteFrame::new(single_link()?, Format::Long)?;
    let cleaned = frame.clean(&mode(Connectedness::Connected))?;
    assert_eq!(cleaned.height(), 6);
    assert_eq!(cleaned.n_firms()?, 3);
    Ok(())
}

#[test]
fn leave_one_observation_out_drops_articulation_observations() -> Result<()> {
    let mut frame = BipartiteFrame::new(single_link()?, Format::Long)?;
    let cleaned = frame.clean(&mode(Connectedness::LeaveOneObservationOut))?;

    assert_eq!(cleaned.height(), 4);
    assert_eq!(cleaned.n_workers()?, 2);
    assert_eq!(ints(cleaned.data(), "j")?, vec![0, 1, 1, 0]);
    assert_eq!(
        cleaned.invariants().connectedness,
        Some(Connectedness::LeaveOneObservationOut)
    );
    assert!(cleaned.invariants().contiguous.i && cleaned.invariants().contiguous.j);
    Ok(())
}

#[test]
fn leave_one_observation_out_on_event_study_converts_through_long() -> Result<()> {
    let es = BipartiteFrame::new(single_link()?, Format::Long)?.to_event_study()?;
    assert_eq!(es.height(), 3);

    let mut frame = es;
    let cleaned = frame.clean(&mode(Connectedness::LeaveOneObservationOut))?;

    assert_eq!(cleaned.format(), Format::EventStudy);
    assert_eq!(cleaned.height(), 2);
    assert_eq!(cleaned.n_firms()?, 2);
    assert_eq!(
        cleaned.invariants().connectedness,
        Some(Connectedness::LeaveOneObservationOut)
    );
    Ok(())
}

#[test]
fn leave_one_firm_out_keeps_the_largest_biconnected_set() -> Result<()> {
    // Worker 0 visits 0 -> 1 -> 2, closing a cycle through the secondary link
    // 0 - 2. Worker 1 hangs firm 3 off firm 2.
    let df = df!(
        "i" => [0_i64, 0, 0, 1, 1],
        "j" => [0_i64, 1, 2, 2, 3],
        "y" => [1.0, 1.0, 1.0, 1.0, 1.0],
        "t" => [1_i64, 2, 3, 1, 2],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::Long)?;
    let cleaned = frame.clean(&mode(Connectedness::LeaveOneFirmOut))?;

    assert_eq!(cleaned.n_firms()?, 3);
    // Worker 1 keeps the observation at firm 2 and is now a stayer.
    assert_eq!(ints(cleaned.data(), "i")?, vec![0, 0, 0, 1]);
    assert_eq!(ints(cleaned.data(), "m")?, vec![1, 1, 1, 0]);
    Ok(())
}

#[test]
fn leave_one_firm_out_recollapses_split_spells() -> Result<()> {
    // Workers 0..3 form a triangle of firms 0, 1, 2. Worker 3 goes 1 -> 3 -> 1
    // and firm 3 only hangs off firm 1.
    let df = df!(
        "i" => [0_i64, 0, 1, 1, 2, 2, 3, 3, 3],
        "j" => [0_i64, 1, 1, 2, 2, 0, 1, 3, 1],
        "y" => [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 9.0, 3.0],
        "t1" => [1_i64, 3, 1, 3, 1, 3, 1, 2, 3],
        "t2" => [2_i64, 4, 2, 4, 2, 4, 1, 2, 3],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::CollapsedLong)?;
    let cleaned = frame.clean(&mode(Connectedness::LeaveOneFirmOut))?;
    let data = cleaned.data();

    assert_eq!(cleaned.height(), 7);
    assert_eq!(cleaned.n_firms()?, 3);
    // Worker 3's two spells at firm 1 merged back into one stay.
    let last = cleaned.height() - 1;
    assert_eq!(ints(data, "i")?[last], 3);
    assert_eq!(ints(data, "j")?[last], 1);
    assert_eq!(ints(data, "t1")?[last], 1);
    assert_eq!(ints(data, "t2")?[last], 3);
    assert_eq!(floats(data, "y")?[last], 2.0);
    assert_eq!(ints(data, "m")?[last], 0);
    Ok(())
}

#[test]
fn forced_loop_on_long_data_converges() -> Result<()> {
    let mut frame = BipartiteFrame::new(single_link()?, Format::Long)?;
    let params = mode(Connectedness::LeaveOneObservationOut).with_fixed_point(FixedPointPolicy {
        force_loop: true,
        max_iterations: 10,
    });
    let cleaned = frame.clean(&params)?;
    assert_eq!(cleaned.height(), 4);
    Ok(())
}

#[test]
fn exceeding_the_iteration_cap_is_an_error() -> Result<()> {
    // Worker 1 stays at an isolated firm, so the first pass drops a row.
    let df = df!(
        "i" => [0_i64, 0, 1],
        "j" => [0_i64, 1, 2],
        "y" => [1.0, 2.0, 3.0],
        "t1" => [1_i64, 3, 1],
        "t2" => [2_i64, 4, 4],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::CollapsedLong)?;
    let params = CleanParams::default().with_fixed_point(FixedPointPolicy {
        force_loop: false,
        max_iterations: 1,
    });

    let err = frame.clean(&params).unwrap_err();
    assert!(matches!(
        err,
        BipartiteError::FixedPointNonConvergence { iterations: 1, rows: 2 }
    ));

    // One more iteration is enough to see the row count settle.
    let params = params.with_fixed_point(FixedPointPolicy {
        force_loop: false,
        max_iterations: 2,
    });
    assert_eq!(frame.clean(&params)?.height(), 2);
    Ok(())
}

#[test]
fn connectivity_is_skipped_when_already_established() -> Result<()> {
    let mut frame = BipartiteFrame::new(single_link()?, Format::Long)?;
    let mut cleaned = frame.clean(&mode(Connectedness::LeaveOneObservationOut))?;

    // Without force a matching mode is trusted as is.
    let again = cleaned.clean(&mode(Connectedness::LeaveOneObservationOut).with_force(false))?;
    assert_eq!(again.height(), cleaned.height());
    assert_eq!(
        again.invariants().connectedness,
        Some(Connectedness::LeaveOneObservationOut)
    );
    Ok(())
}

#[test]
fn dropping_multiples_can_disconnect_a_later_pass() -> Result<()> {
    // Worker 0 has two neighbouring spells at firm 0 and is the only link
    // to firm 1. Dropping those spells leaves firm 0 with worker 3 alone.
    let df = df!(
        "i" => [0_i64, 0, 0, 1, 2, 3],
        "j" => [0_i64, 0, 1, 1, 1, 0],
        "y" => [1.0, 1.0, 2.0, 2.0, 2.0, 1.0],
        "t1" => [1_i64, 2, 3, 1, 1, 1],
        "t2" => [1_i64, 2, 3, 3, 3, 3],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::CollapsedLong)?;
    let params = mode(Connectedness::Connected)
        .with_component_size(ComponentSize::Rows)
        .with_drop_multiples(true);

    let capped = params.clone().with_fixed_point(FixedPointPolicy {
        force_loop: false,
        max_iterations: 2,
    });
    let err = frame.clean(&capped).unwrap_err();
    assert!(matches!(
        err,
        BipartiteError::FixedPointNonConvergence { iterations: 2, rows: 3 }
    ));

    let cleaned = frame.clean(&params)?;
    assert_eq!(cleaned.height(), 3);
    assert_eq!(ints(cleaned.data(), "i")?, vec![0, 1, 2]);
    assert_eq!(ints(cleaned.data(), "j")?, vec![0, 0, 0]);
    assert_eq!(ints(cleaned.data(), "m")?, vec![0, 0, 0]);
    Ok(())
}

#[test]
fn leave_one_observation_out_survives_any_single_removal() -> Result<()> {
    let mut frame = BipartiteFrame::new(web()?, Format::Long)?.to_collapsed_long()?;
    let cleaned = frame.clean(&mode(Connectedness::LeaveOneObservationOut))?;
    assert!(cleaned.height() > 0);
    assert!(firms_connected(cleaned.data())?);

    // Collapsed rows are spells, so every row is one observation.
    for row in 0..cleaned.height() {
        let mut mask = vec![true; cleaned.height()];
        mask[row] = false;
        let rest = cleaned
            .data()
            .filter(&BooleanChunked::from_slice("keep".into(), &mask))?;
        assert!(firms_connected(&rest)?, "removing row {row} disconnects");
    }
    Ok(())
}

#[test]
fn leave_one_firm_out_survives_any_single_firm_removal() -> Result<()> {
    let mut frame = BipartiteFrame::new(web()?, Format::Long)?;
    let cleaned = frame.clean(&mode(Connectedness::LeaveOneFirmOut))?;
    assert!(cleaned.n_firms()? > 2);
    assert!(firms_connected(cleaned.data())?);

    for firm in cleaned.unique_ids(Logical::J)? {
        let mut rest = cleaned.clone();
        rest.drop_ids(Logical::J, &[firm])?;
        assert!(firms_connected(rest.data())?, "removing firm {firm} disconnects");
    }
    Ok(())
}
