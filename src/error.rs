use thiserror::Error;

/// Errors of the forecasting core.
///
/// `InsufficientData` and `InsufficientHistory` are expected, recoverable
/// outcomes the caller has to check, typically right after loading a short
/// dataset. `WidthMismatch`, `NotTrained` and `NoTarget` are contract
/// violations: they mean the caller sequenced the API wrong.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("column '{0}' does not exist in the dataset")]
    UnknownColumn(String),

    #[error("column '{0}' is not numeric")]
    NonNumericColumn(String),

    #[error("the lag set is empty")]
    EmptyLagSet,

    #[error("lags must be positive, got {0}")]
    InvalidLag(usize),

    #[error("row {row} has {actual} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("insufficient data: need at least {required} training examples, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("not enough finite history to build the inference vector")]
    InsufficientHistory,

    #[error("feature vector has width {actual} but the model was trained on width {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("no model has been trained")]
    NotTrained,

    #[error("no target column has been selected")]
    NoTarget,
}

pub type ForecastResult<T> = Result<T, ForecastError>;
