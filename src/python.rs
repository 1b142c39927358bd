use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::frame::BipartiteFrame;
use crate::params::{CleanParams, ComponentSize, Connectedness, DuplicateHow};
use crate::schema::{self, Logical};
use crate::Format;

#[pyclass(name = "BipartiteFrame")]
pub struct PyBipartiteFrame {
    inner: BipartiteFrame,
}

#[pymethods]
impl PyBipartiteFrame {
    /// Wrap a panel.
    ///
    /// Required columns: i, j, y (j1, j2, y1, y2 for event-study formats).
    /// Optional columns: t, g, w in their per-format variants.
    #[new]
    #[pyo3(signature = (data, format="long", track_id_changes=false))]
    fn new(data: PyDataFrame, format: &str, track_id_changes: bool) -> PyResult<Self> {
        let format: Format = format.parse()?;
        let inner = BipartiteFrame::new(data.0, format)?.with_id_tracking(track_id_changes);
        Ok(Self { inner })
    }

    // ── Cleaning ────────────────────────────────────────────────────────────

    /// Clean a copy of the data. Pass `connectedness=None` to skip the
    /// connectivity stage.
    #[pyo3(signature = (
        connectedness=Some("connected"),
        component_size="firms",
        i_t_how="max",
        drop_multiples=false,
        is_sorted=false,
        force=true,
        force_loop=false,
        max_iterations=100,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn clean(
        &mut self,
        connectedness: Option<&str>,
        component_size: &str,
        i_t_how: &str,
        drop_multiples: bool,
        is_sorted: bool,
        force: bool,
        force_loop: bool,
        max_iterations: usize,
    ) -> PyResult<Self> {
        let connectedness = connectedness
            .map(str::parse::<Connectedness>)
            .transpose()?;
        let mut params = CleanParams::default()
            .with_connectedness(connectedness)
            .with_component_size(component_size.parse::<ComponentSize>()?)
            .with_i_t_how(i_t_how.parse::<DuplicateHow>()?)
            .with_drop_multiples(drop_multiples)
            .with_is_sorted(is_sorted)
            .with_force(force)
            .with_copy(true);
        params.fixed_point.force_loop = force_loop;
        params.fixed_point.max_iterations = max_iterations;

        let inner = self.inner.clean(&params)?;
        Ok(Self { inner })
    }

    // ── Conversion ──────────────────────────────────────────────────────────

    fn to_long(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.to_long()?,
        })
    }

    fn to_collapsed_long(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.to_collapsed_long()?,
        })
    }

    fn to_event_study(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.to_event_study()?,
        })
    }

    fn to_collapsed_event_study(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.to_collapsed_event_study()?,
        })
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    #[getter]
    fn data(&self) -> PyDataFrame {
        PyDataFrame(self.inner.data().clone())
    }

    #[getter]
    fn format(&self) -> &'static str {
        self.inner.format().as_str()
    }

    #[getter]
    fn track_id_changes(&self) -> bool {
        self.inner.tracks_id_changes()
    }

    #[getter]
    fn connectedness(&self) -> Option<&'static str> {
        self.inner.invariants().connectedness.map(Connectedness::as_str)
    }

    #[getter]
    fn no_na(&self) -> bool {
        self.inner.invariants().no_na
    }

    #[getter]
    fn no_duplicates(&self) -> bool {
        self.inner.invariants().no_duplicates
    }

    #[getter]
    fn i_t_unique(&self) -> Option<bool> {
        self.inner.invariants().i_t_unique
    }

    /// Contiguity flag for "i", "j" or "g"; None when the column is absent.
    fn is_contiguous(&self, column: &str) -> Option<bool> {
        let logical = match column {
            "i" => Logical::I,
            "j" => Logical::J,
            "g" => Logical::G,
            _ => return None,
        };
        self.inner.invariants().contiguous.get(logical)
    }

    fn n_workers(&self) -> PyResult<usize> {
        Ok(self.inner.n_workers()?)
    }

    fn n_firms(&self) -> PyResult<usize> {
        Ok(self.inner.n_firms()?)
    }

    fn n_clusters(&self) -> PyResult<Option<usize>> {
        Ok(self.inner.n_clusters()?)
    }

    /// Keep only firms with at least `threshold` movers.
    #[pyo3(signature = (threshold=15, drop_multiples=false))]
    fn min_movers_frame(&self, threshold: usize, drop_multiples: bool) -> PyResult<Self> {
        let params = CleanParams::default().with_drop_multiples(drop_multiples);
        Ok(Self {
            inner: self.inner.min_movers_frame(threshold, &params)?,
        })
    }

    fn summary(&self) -> PyResult<String> {
        Ok(self.inner.summary()?.to_string())
    }

    /// Data with original ids restored next to the current ones.
    fn original_ids(&self) -> PyResult<Option<PyDataFrame>> {
        Ok(self.inner.original_ids()?.map(PyDataFrame))
    }
}

/// Export column names as Python submodules.
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let ids = PyModule::new(m.py(), "ids")?;
    for name in [
        schema::ids::I,
        schema::ids::J,
        schema::ids::J1,
        schema::ids::J2,
        schema::ids::G,
        schema::ids::G1,
        schema::ids::G2,
    ] {
        ids.add(name.to_uppercase(), name)?;
    }
    m.add_submodule(&ids)?;

    let values = PyModule::new(m.py(), "values")?;
    for name in [
        schema::values::Y,
        schema::values::Y1,
        schema::values::Y2,
        schema::values::W,
        schema::values::W1,
        schema::values::W2,
        schema::values::M,
    ] {
        values.add(name.to_uppercase(), name)?;
    }
    m.add_submodule(&values)?;

    let periods = PyModule::new(m.py(), "periods")?;
    for name in [
        schema::periods::T,
        schema::periods::T1,
        schema::periods::T2,
        schema::periods::T11,
        schema::periods::T12,
        schema::periods::T21,
        schema::periods::T22,
    ] {
        periods.add(name.to_uppercase(), name)?;
    }
    m.add_submodule(&periods)?;

    Ok(())
}

#[pymodule]
fn bipartite_panel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBipartiteFrame>()?;
    add_schema_exports(m)?;
    Ok(())
}
