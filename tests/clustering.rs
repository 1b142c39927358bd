use anyhow::Result;
use bipartite_panel::{
    BipartiteError, BipartiteFrame, CleanParams, ClusterParams, FirmFeatures, FirmMeanOutcome,
    FirmMeasure, Format,
};
use polars::prelude::*;

fn ints(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    Ok(df.column(name)?.i64()?.into_no_null_iter().collect())
}

/// Firm 0 pays 1.0 and firm 1 pays 3.0; worker 0 links them.
fn cleaned() -> Result<BipartiteFrame> {
    let df = df!(
        "i" => [0_i64, 0, 1, 1, 2, 2],
        "j" => [0_i64, 1, 0, 0, 1, 1],
        "y" => [1.0, 3.0, 1.0, 1.0, 3.0, 3.0],
        "t" => [1_i64, 2, 1, 2, 1, 2],
    )?;
    let mut frame = BipartiteFrame::new(df, Format::Long)?;
    Ok(frame.clean(&CleanParams::default())?)
}

#[test]
fn mean_outcome_is_measured_per_firm() -> Result<()> {
    let features = FirmMeanOutcome.measure(&cleaned()?)?;
    assert_eq!(
        features,
        FirmFeatures {
            firms: vec![0, 1],
            features: vec![vec![1.0], vec![3.0]],
            weights: vec![3.0, 3.0],
        }
    );
    Ok(())
}

#[test]
fn closure_groupings_assign_contiguous_clusters() -> Result<()> {
    let frame = cleaned()?;
    let by_pay = |features: &FirmFeatures| -> bipartite_panel::Result<Vec<Option<i64>>> {
        Ok(features
            .features
            .iter()
            .map(|f| Some(if f[0] > 2.0 { 5 } else { 9 }))
            .collect())
    };
    let clustered = frame.cluster(&FirmMeanOutcome, &by_pay, &ClusterParams::default())?;

    assert_eq!(clustered.n_clusters()?, Some(2));
    assert_eq!(ints(clustered.data(), "g")?, vec![0, 1, 0, 0, 1, 1]);
    assert_eq!(clustered.invariants().contiguous.g, Some(true));
    assert_eq!(clustered.height(), frame.height());
    Ok(())
}

#[test]
fn unclustered_firms_are_kept_as_nulls_by_default() -> Result<()> {
    let frame = cleaned()?;
    let low_only = |features: &FirmFeatures| -> bipartite_panel::Result<Vec<Option<i64>>> {
        Ok(features
            .features
            .iter()
            .map(|f| (f[0] < 2.0).then_some(0))
            .collect())
    };
    let clustered = frame.cluster(&FirmMeanOutcome, &low_only, &ClusterParams::default())?;

    assert_eq!(clustered.height(), 6);
    assert_eq!(clustered.data().column("g")?.null_count(), 3);
    assert_eq!(clustered.n_clusters()?, Some(1));
    Ok(())
}

#[test]
fn dropping_unclustered_firms_cleans_again() -> Result<()> {
    let frame = cleaned()?;
    let low_only = |features: &FirmFeatures| -> bipartite_panel::Result<Vec<Option<i64>>> {
        Ok(features
            .features
            .iter()
            .map(|f| (f[0] < 2.0).then_some(0))
            .collect())
    };
    let params = ClusterParams {
        drop_unclustered: true,
        clean: None,
    };
    let clustered = frame.cluster(&FirmMeanOutcome, &low_only, &params)?;

    assert_eq!(clustered.height(), 3);
    assert_eq!(clustered.n_firms()?, 1);
    assert_eq!(ints(clustered.data(), "i")?, vec![0, 1, 1]);
    assert_eq!(ints(clustered.data(), "m")?, vec![0, 0, 0]);
    assert_eq!(
        clustered.invariants().connectedness,
        frame.invariants().connectedness
    );
    Ok(())
}

#[test]
fn groupings_must_cover_every_firm() -> Result<()> {
    let frame = cleaned()?;
    let too_short =
        |_: &FirmFeatures| -> bipartite_panel::Result<Vec<Option<i64>>> { Ok(vec![Some(0)]) };
    let err = frame
        .cluster(&FirmMeanOutcome, &too_short, &ClusterParams::default())
        .unwrap_err();
    assert!(matches!(err, BipartiteError::InvalidData(_)));
    Ok(())
}
