use crate::data::{Cell, Dataset};
use crate::error::{ForecastError, ForecastResult};
use crate::DEFAULT_LAGS;
use chrono::Datelike;
use std::f64::consts::PI;

/// Configuration of the lagged feature layout.
///
/// The layout for a row at position `t` in the time-sorted sequence is:
/// every exogenous numeric column at `t`, then per lag (ascending) the
/// target and every exogenous column at `t - lag`, then the four cyclic
/// weekday/month terms when `cyclic_time` is set and the dataset has a
/// timestamp column.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeatureConfig {
    pub target: String,
    pub lags: Vec<usize>,
    pub cyclic_time: bool,
}

impl FeatureConfig {
    pub fn new(target: &str) -> FeatureConfig {
        FeatureConfig {
            target: target.to_string(),
            lags: DEFAULT_LAGS.to_vec(),
            cyclic_time: true,
        }
    }
}

/// One supervised example: the features at time `t`, the target at `t + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: Vec<f64>,
    pub label: f64,
}

/// Output of the assembler.
///
/// `examples` is time-ordered. `next_vector` is the feature vector of the
/// most recent row, i.e. the input for the one-step-ahead forecast; it is
/// `None` when the history is too short or contains non-finite slots.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub examples: Vec<TrainingExample>,
    pub next_vector: Option<Vec<f64>>,
    pub width: usize,
}

/// Width of every feature vector for `n_exo` exogenous columns.
pub fn feature_width(n_exo: usize, n_lags: usize, cyclic: bool) -> usize {
    n_exo + n_lags * (1 + n_exo) + if cyclic { 4 } else { 0 }
}

fn finite_number(cell: &Cell) -> Option<f64> {
    match cell.as_number() {
        Some(x) if x.is_finite() => Some(x),
        _ => None,
    }
}

/// Four slots: sin/cos of the weekday (period 7), sin/cos of the month
/// (period 12). An invalid timestamp yields zeros, never NaN, so the row
/// is not dropped by the finiteness check.
fn push_cyclic(out: &mut Vec<f64>, cell: &Cell) {
    match cell.as_timestamp() {
        Some(ts) => {
            let weekday = f64::from(ts.weekday().num_days_from_monday());
            let month = f64::from(ts.month());
            out.push((2. * PI * weekday / 7.).sin());
            out.push((2. * PI * weekday / 7.).cos());
            out.push((2. * PI * month / 12.).sin());
            out.push((2. * PI * month / 12.).cos());
        }
        None => {
            for _ in 0..4 {
                out.push(0.);
            }
        }
    }
}

/// Build the time-ordered training examples and the inference vector.
///
/// Rows are first restricted to those with a valid timestamp when a
/// timestamp column exists, then sorted ascending by it; lag positions and
/// the `t + 1` label are defined purely by position in that sequence. Rows
/// with any absent or non-finite slot or label are dropped, not imputed.
pub fn build_training_set(
    dataset: &Dataset,
    config: &FeatureConfig,
) -> ForecastResult<TrainingSet> {
    let target_col = dataset
        .column_index(&config.target)
        .ok_or_else(|| ForecastError::UnknownColumn(config.target.clone()))?;
    if !dataset.is_numeric(&config.target) {
        return Err(ForecastError::NonNumericColumn(config.target.clone()));
    }
    if config.lags.is_empty() {
        return Err(ForecastError::EmptyLagSet);
    }
    if let Some(&l) = config.lags.iter().find(|&&l| l == 0) {
        return Err(ForecastError::InvalidLag(l));
    }

    let mut lags = config.lags.clone();
    lags.sort_unstable();
    lags.dedup();
    let max_lag = *lags.last().expect("non-empty lags");

    let exo_cols: Vec<usize> = dataset
        .numeric_columns()
        .iter()
        .filter(|name| *name != &config.target)
        .map(|name| dataset.column_index(name).expect("numeric column exists"))
        .collect();

    let ts_col = dataset
        .timestamp_column()
        .map(|name| dataset.column_index(name).expect("timestamp column exists"));

    // Row order: filtered to valid timestamps and sorted by them, or the
    // load order when there is no timestamp column.
    let order: Vec<usize> = match ts_col {
        Some(col) => {
            let mut stamped: Vec<(chrono::NaiveDateTime, usize)> = (0..dataset.n_rows())
                .filter_map(|row| dataset.cell(row, col).as_timestamp().map(|ts| (ts, row)))
                .collect();
            stamped.sort();
            stamped.into_iter().map(|(_, row)| row).collect()
        }
        None => (0..dataset.n_rows()).collect(),
    };

    let cyclic = config.cyclic_time && ts_col.is_some();
    let width = feature_width(exo_cols.len(), lags.len(), cyclic);

    // Feature vector at position t of the sorted sequence, None as soon as
    // one slot is absent or non-finite.
    let vector_at = |t: usize| -> Option<Vec<f64>> {
        let mut out = Vec::with_capacity(width);
        for &col in &exo_cols {
            out.push(finite_number(dataset.cell(order[t], col))?);
        }
        for &lag in &lags {
            let row = order[t - lag];
            out.push(finite_number(dataset.cell(row, target_col))?);
            for &col in &exo_cols {
                out.push(finite_number(dataset.cell(row, col))?);
            }
        }
        if cyclic {
            push_cyclic(&mut out, dataset.cell(order[t], ts_col.expect("cyclic")));
        }
        Some(out)
    };

    let n = order.len();
    let mut examples = Vec::new();
    if n >= max_lag + 2 {
        for t in max_lag..=(n - 2) {
            let label = match finite_number(dataset.cell(order[t + 1], target_col)) {
                Some(label) => label,
                None => continue,
            };
            if let Some(features) = vector_at(t) {
                examples.push(TrainingExample { features, label });
            }
        }
    }

    let next_vector = if n >= max_lag + 1 {
        vector_at(n - 1)
    } else {
        None
    };

    Ok(TrainingSet {
        examples,
        next_vector,
        width,
    })
}
