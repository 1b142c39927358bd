use thiserror::Error;

#[derive(Error, Debug)]
pub enum BipartiteError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Column '{column}' has dtype {dtype}, expected {expected}")]
    ColumnType {
        column: String,
        dtype: String,
        expected: &'static str,
    },

    #[error("Invalid value '{value}' for parameter {name}, expected one of: {expected}")]
    Parameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(
        "Fixed-point loop did not converge after {iterations} iterations ({rows} rows in last state)"
    )]
    FixedPointNonConvergence { iterations: usize, rows: usize },

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl BipartiteError {
    /// True for the errors raised while validating column presence and dtypes.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            BipartiteError::MissingColumn(_) | BipartiteError::ColumnType { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BipartiteError>;

#[cfg(feature = "python")]
impl From<BipartiteError> for pyo3::PyErr {
    fn from(err: BipartiteError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyRuntimeError, PyValueError};

        match err {
            BipartiteError::Parameter { .. } => PyValueError::new_err(err.to_string()),
            e if e.is_schema_error() => PyValueError::new_err(e.to_string()),
            e => PyRuntimeError::new_err(e.to_string()),
        }
    }
}
