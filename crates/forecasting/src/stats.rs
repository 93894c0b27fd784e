//! Small deterministic statistics helpers.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Sample standard deviation (n-1), deterministic.
pub fn stddev_sample(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs
        .iter()
        .map(|x| {
            let d = x - m;
            d * d
        })
        .sum::<f64>()
        / ((xs.len() - 1) as f64);
    var.sqrt()
}

/// Coefficient of variation (sample stdev / mean); 0 when the mean is 0.
pub fn coefficient_of_variation(xs: &[f64]) -> f64 {
    let m = mean(xs);
    if m.abs() <= f64::EPSILON {
        return 0.0;
    }
    stddev_sample(xs) / m
}

/// One-sample t statistic of `xs` against `null_mean`.
///
/// `None` with fewer than two samples. A zero spread yields an infinite
/// statistic unless the mean equals the null exactly.
pub fn t_statistic(xs: &[f64], null_mean: f64) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let diff = mean(xs) - null_mean;
    let se = stddev_sample(xs) / (xs.len() as f64).sqrt();
    if se <= f64::EPSILON {
        return Some(if diff.abs() <= f64::EPSILON { 0.0 } else { f64::INFINITY });
    }
    Some(diff / se)
}

/// Ordinary least-squares slope and intercept of `ys` against 0..n.
pub fn linear_trend(ys: &[f64]) -> Option<(f64, f64)> {
    if ys.len() < 2 {
        return None;
    }
    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(ys);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den <= f64::EPSILON {
        return None;
    }
    let slope = num / den;
    Some((slope, y_mean - slope * x_mean))
}

pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() {
        return lo;
    }
    x.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stddev_of_known_series() {
        let sd = stddev_sample(&[1.40, 1.45, 1.50]);
        assert!((sd - 0.05).abs() < 1e-9);
    }

    #[test]
    fn t_statistic_handles_degenerate_inputs() {
        assert_eq!(t_statistic(&[1.2], 1.0), None);
        assert_eq!(t_statistic(&[1.0, 1.0], 1.0), Some(0.0));
        assert_eq!(t_statistic(&[1.3, 1.3], 1.0), Some(f64::INFINITY));
    }

    #[test]
    fn linear_trend_recovers_slope() {
        let (slope, intercept) = linear_trend(&[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 2.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_maps_nan_to_lower_bound() {
        assert_eq!(clamp(f64::NAN, 0.1, 1.0), 0.1);
        assert_eq!(clamp(3.0, 0.1, 1.0), 1.0);
    }
}
