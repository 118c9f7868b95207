//! Column statistics over finite samples.
//!
//! Standard deviation is the sample estimate (n - 1). Skewness and kurtosis
//! are the bias-adjusted estimators (G1, excess G2). Undefined results (too
//! few samples, zero variance, empty input) are reported as 0 so feature
//! vectors stay well-formed for tiny batches.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn std_dev(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    (central_sum(xs, 2) / (n - 1) as f64).sqrt()
}

pub fn skewness(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 3 {
        return 0.0;
    }
    let m2 = central_sum(xs, 2);
    if m2 == 0.0 {
        return 0.0;
    }
    let m3 = central_sum(xs, 3);
    let n = n as f64;
    (n * (n - 1.0).sqrt() / (n - 2.0)) * (m3 / m2.powf(1.5))
}

pub fn kurtosis(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 4 {
        return 0.0;
    }
    let m2 = central_sum(xs, 2);
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = central_sum(xs, 4);
    let n = n as f64;
    let num = n * (n + 1.0) * (n - 1.0) * m4;
    let den = (n - 2.0) * (n - 3.0) * m2 * m2;
    let adj = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    num / den - adj
}

pub fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sum of (x - mean)^k
fn central_sum(xs: &[f64], k: i32) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(k)).sum()
}
