use anyhow::Result;
use bipartite_panel::{BipartiteFrame, CleanParams, Connectedness, Format};
use polars::prelude::*;

fn ints(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    Ok(df.column(name)?.i64()?.into_no_null_iter().collect())
}

fn floats(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(df.column(name)?.f64()?.into_no_null_iter().collect())
}

fn names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

/// Worker 0 moves 0 -> 1 and stays two periods; worker 1 stays at 1.
fn panel() -> Result<BipartiteFrame> {
    let df = df!(
        "i" => [0_i64, 0, 0, 1, 1],
        "j" => [0_i64, 1, 1, 1, 1],
        "y" => [1.0, 2.0, 4.0, 3.0, 5.0],
        "t" => [1_i64, 2, 3, 1, 2],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::Long)?;
    Ok(frame.clean(&CleanParams::default())?)
}

#[test]
fn long_to_event_study_pairs_movers_and_stayers() -> Result<()> {
    let es = panel()?.to_event_study()?;
    let data = es.data();

    assert_eq!(es.format(), Format::EventStudy);
    assert_eq!(names(data), ["i", "j1", "j2", "y1", "y2", "t1", "t2", "m"]);
    assert_eq!(ints(data, "i")?, vec![0, 0, 1, 1]);
    assert_eq!(ints(data, "j1")?, vec![0, 1, 1, 1]);
    assert_eq!(ints(data, "j2")?, vec![1, 1, 1, 1]);
    assert_eq!(ints(data, "t1")?, vec![1, 2, 1, 2]);
    assert_eq!(ints(data, "t2")?, vec![2, 3, 1, 2]);
    assert_eq!(ints(data, "m")?, vec![1, 0, 0, 0]);
    Ok(())
}

#[test]
fn event_study_round_trips_to_long() -> Result<()> {
    let long = panel()?;
    let back = long.to_event_study()?.to_long()?;

    for column in ["i", "j", "t", "m"] {
        assert_eq!(ints(back.data(), column)?, ints(long.data(), column)?);
    }
    assert_eq!(floats(back.data(), "y")?, floats(long.data(), "y")?);
    assert_eq!(back.invariants(), long.invariants());
    Ok(())
}

#[test]
fn collapsing_merges_spells_and_adds_weights() -> Result<()> {
    let collapsed = panel()?.to_collapsed_long()?;
    let data = collapsed.data();

    assert_eq!(names(data), ["i", "j", "y", "t1", "t2", "w", "m"]);
    assert_eq!(ints(data, "j")?, vec![0, 1, 1]);
    assert_eq!(floats(data, "y")?, vec![1.0, 3.0, 4.0]);
    assert_eq!(ints(data, "t1")?, vec![1, 2, 1]);
    assert_eq!(ints(data, "t2")?, vec![1, 3, 2]);
    assert_eq!(floats(data, "w")?, vec![1.0, 2.0, 2.0]);
    // Collapsed flags count both directions of a move.
    assert_eq!(ints(data, "m")?, vec![1, 1, 0]);
    Ok(())
}

#[test]
fn collapsed_event_study_has_four_period_columns() -> Result<()> {
    let ces = panel()?.to_collapsed_event_study()?;
    let data = ces.data();

    assert_eq!(
        names(data),
        ["i", "j1", "j2", "y1", "y2", "t11", "t12", "t21", "t22", "w1", "w2", "m"]
    );
    assert_eq!(ces.height(), 2);
    assert_eq!(ints(data, "t11")?, vec![1, 1]);
    assert_eq!(ints(data, "t12")?, vec![1, 2]);
    assert_eq!(ints(data, "t21")?, vec![2, 1]);
    assert_eq!(ints(data, "t22")?, vec![3, 2]);
    Ok(())
}

#[test]
fn uncollapsing_spreads_weight_over_periods() -> Result<()> {
    let long = panel()?.to_collapsed_long()?.to_long()?;
    let data = long.data();

    assert_eq!(ints(data, "t")?, vec![1, 2, 3, 1, 2]);
    assert_eq!(floats(data, "y")?, vec![1.0, 3.0, 3.0, 4.0, 4.0]);
    assert_eq!(floats(data, "w")?, vec![1.0, 1.0, 1.0, 1.0, 1.0]);
    Ok(())
}

#[test]
fn event_study_input_is_cleaned_on_pairs() -> Result<()> {
    let df = df!(
        "i" => [0_i64, 1, 2],
        "j1" => [0_i64, 1, 2],
        "j2" => [1_i64, 1, 2],
        "y1" => [1.0, 2.0, 3.0],
        "y2" => [1.5, 2.0, 3.0],
        "t1" => [1_i64, 1, 1],
        "t2" => [2_i64, 1, 1],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::EventStudy)?;
    let cleaned = frame.clean(&CleanParams::default())?;

    assert_eq!(cleaned.format(), Format::EventStudy);
    assert_eq!(cleaned.height(), 2);
    assert_eq!(cleaned.n_firms()?, 2);
    assert_eq!(
        cleaned.invariants().connectedness,
        Some(Connectedness::Connected)
    );
    Ok(())
}

#[test]
fn formats_parse_from_their_names() -> Result<()> {
    for format in [
        Format::Long,
        Format::CollapsedLong,
        Format::EventStudy,
        Format::CollapsedEventStudy,
    ] {
        assert_eq!(format.as_str().parse::<Format>()?, format);
    }
    assert!("wide".parse::<Format>().is_err());
    Ok(())
}
