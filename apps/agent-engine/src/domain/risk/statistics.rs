//! Statistics used by the risk gatekeeper.

/// Arithmetic mean, `None` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1), `None` below two points.
#[must_use]
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Pearson correlation over the aligned tails of two series.
///
/// Uses the most recent `min(a.len(), b.len())` points of each. Returns
/// `None` with fewer than `min_points` overlapping points or when either
/// tail has zero variance.
#[must_use]
pub fn pearson_correlation(a: &[f64], b: &[f64], min_points: usize) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < min_points.max(2) {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

/// Largest peak-to-trough decline of an equity curve, as a fraction of the peak.
#[must_use]
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// Decline of the last point from the running peak, as a fraction of the peak.
#[must_use]
pub fn current_drawdown(equity: &[f64]) -> f64 {
    let Some(&last) = equity.last() else {
        return 0.0;
    };
    let peak = equity.iter().copied().fold(f64::MIN, f64::max);
    if peak <= 0.0 {
        return 0.0;
    }
    ((peak - last) / peak).max(0.0)
}

/// Inverse of the standard normal CDF (Acklam's rational approximation).
///
/// Accurate to about 1.15e-9 on `(0, 1)`; clamps `p` into that interval.
#[must_use]
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    let p = p.clamp(1e-12, 1.0 - 1e-12);

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), Some(5.0));
        let std = sample_std_dev(&values).unwrap();
        assert!((std - 2.138_089_935).abs() < 1e-6);
        assert_eq!(sample_std_dev(&[1.0]), None);
    }

    #[test]
    fn test_perfect_correlation() {
        let a = [0.01, -0.02, 0.03, 0.005, -0.01];
        let b: Vec<f64> = a.iter().map(|x| x * 2.0).collect();
        let neg: Vec<f64> = a.iter().map(|x| -x).collect();
        assert!((pearson_correlation(&a, &b, 3).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson_correlation(&a, &neg, 3).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_needs_overlap_and_variance() {
        assert_eq!(pearson_correlation(&[0.1, 0.2], &[0.1, 0.2], 5), None);
        assert_eq!(pearson_correlation(&[0.1; 10], &[0.2, 0.1, 0.3, 0.1, 0.2], 3), None);
    }

    #[test]
    fn test_correlation_aligns_tails() {
        let a = [9.0, 9.0, 0.01, 0.02, 0.03];
        let b = [0.01, 0.02, 0.03];
        assert!((pearson_correlation(&a, &b, 3).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawdowns() {
        let curve = [100.0, 120.0, 90.0, 110.0];
        assert!((max_drawdown(&curve) - 0.25).abs() < 1e-12);
        assert!((current_drawdown(&curve) - (10.0 / 120.0)).abs() < 1e-12);
        assert_eq!(current_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_inverse_normal_known_quantiles() {
        assert!((inverse_normal_cdf(0.95) - 1.644_853_627).abs() < 1e-6);
        assert!((inverse_normal_cdf(0.99) - 2.326_347_874).abs() < 1e-6);
        assert!(inverse_normal_cdf(0.5).abs() < 1e-9);
        assert!((inverse_normal_cdf(0.01) + 2.326_347_874).abs() < 1e-6);
    }
}
