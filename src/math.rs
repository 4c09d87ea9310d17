pub fn sum(v: &[f64]) -> f64 {
    let mut o = 0.;
    for e in v.iter() {
        o += *e;
    }
    o
}

pub fn mean(v: &[f64]) -> f64 {
    sum(&v) / (v.len() as f64)
}

/// Population variance (mean squared deviation). Zero on an empty slice.
pub fn variance(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.;
    }
    let m = mean(v);
    let mut o = 0.;
    for e in v.iter() {
        o += (*e - m).powi(2);
    }
    o / (v.len() as f64)
}

pub fn rmse(target: &[f64], yhat: &[f64]) -> f64 {
    let rmse: f64 = yhat
        .iter()
        .zip(target.iter())
        .map(|(&a, &b)| (a - b).powi(2))
        .sum();
    (rmse / target.len() as f64).sqrt()
}

pub(crate) fn sum_indices(v: &[f64], indices: &[usize]) -> f64 {
    // A sum over a null set is not possible there, and this catch bugs.
    // The speed difference is negligible
    assert_ne!(indices.len(), 0);
    let mut o = 0.;
    for &i in indices {
        o += v[i];
    }
    o
}

pub(crate) fn mean_indices(v: &[f64], indices: &[usize]) -> f64 {
    sum_indices(v, indices) / (indices.len() as f64)
}

pub(crate) fn variance_indices(v: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.;
    }
    let m = mean_indices(v, indices);
    let mut o = 0.;
    for &i in indices {
        o += (v[i] - m).powi(2);
    }
    o / (indices.len() as f64)
}
