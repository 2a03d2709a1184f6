use serde::{Deserialize, Serialize};

/// Confidence interval over the card count, expressed as distribution
/// percentiles. `high_variance` marks a spread too wide to trust extreme
/// markets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub p10: u32,
    pub p25: u32,
    pub p50: u32,
    pub p75: u32,
    pub p90: u32,
    pub high_variance: bool,
}

impl ConfidenceInterval {
    pub fn width(&self) -> u32 {
        self.p90.saturating_sub(self.p10)
    }
}

/// Interval spread above which the forecast is flagged high-variance.
const HIGH_VARIANCE_WIDTH: u32 = 6;

/// ln Γ(x) for x > 0, Lanczos approximation (g = 7, n = 9). Accurate to
/// well below 1e-10 over the range the engine ever sees (x ≤ ~50).
fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection for the tiny-x cases that dispersion adjustments can
        // produce.
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEF[0];
    for (i, c) in COEF.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Poisson P(Y = k). A non-positive lambda collapses the distribution onto
/// zero: probability 1 at k = 0, probability 0 elsewhere.
pub fn poisson_pmf(k: i64, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    if k < 0 {
        return 0.0;
    }
    let kf = k as f64;
    // Log space so large k cannot overflow the factorial.
    let log_p = -lambda + kf * lambda.ln() - ln_gamma(kf + 1.0);
    let p = log_p.exp();
    if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 }
}

/// Negative Binomial P(Y = k) with dispersion r and success probability p.
///
/// Smaller r means more overdispersion (variance above the mean), which is
/// what card counts show: one booking raises the temperature and draws
/// more. Degenerate parameters yield the sentinel probability 0 rather
/// than an error.
pub fn neg_binomial_pmf(k: i64, r: f64, p: f64) -> f64 {
    if r <= 0.0 || p <= 0.0 || p >= 1.0 || k < 0 {
        return 0.0;
    }
    let kf = k as f64;
    // C(k + r - 1, k) = Γ(k + r) / (Γ(r) k!)
    let log_coef = ln_gamma(kf + r) - ln_gamma(r) - ln_gamma(kf + 1.0);
    let log_p = log_coef + r * p.ln() + kf * (1.0 - p).ln();
    let prob = log_p.exp();
    if prob.is_finite() {
        prob.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Success probability for a Negative Binomial with mean `lambda` and
/// dispersion `r`: p = r / (r + λ), clamped away from the open-interval
/// endpoints.
pub fn negbin_p(lambda: f64, r: f64) -> f64 {
    if lambda <= 0.0 {
        return 0.999;
    }
    (r / (r + lambda)).clamp(0.001, 0.999)
}

/// P(Y ≤ k_max) under Negative Binomial (mean λ, dispersion r) or plain
/// Poisson when `use_negbin` is false or r is degenerate.
pub fn cdf(k_max: i64, lambda: f64, r: f64, use_negbin: bool) -> f64 {
    let mut acc = 0.0;
    if use_negbin && r > 0.0 {
        let p = negbin_p(lambda, r);
        for k in 0..=k_max {
            acc += neg_binomial_pmf(k, r, p);
        }
    } else {
        for k in 0..=k_max {
            acc += poisson_pmf(k, lambda);
        }
    }
    acc.clamp(0.0, 1.0)
}

/// Percentiles of the card-count distribution, scanning k upward until the
/// cdf reaches each target. The scan bound 3λ+10 is far beyond any
/// realistic card count.
pub fn percentiles(lambda: f64, r: f64, use_negbin: bool) -> ConfidenceInterval {
    let max_k = (lambda.max(0.0) * 3.0) as i64 + 10;

    let targets = [0.10, 0.25, 0.50, 0.75, 0.90];
    let mut found = [max_k as u32; 5];
    let mut next = 0usize;

    let p = negbin_p(lambda, r);
    let mut acc = 0.0;
    for k in 0..=max_k {
        acc += if use_negbin && r > 0.0 {
            neg_binomial_pmf(k, r, p)
        } else {
            poisson_pmf(k, lambda)
        };
        let cdf_k = acc.min(1.0);
        while next < targets.len() && cdf_k >= targets[next] {
            found[next] = k as u32;
            next += 1;
        }
        if next == targets.len() {
            break;
        }
    }

    let width = found[4].saturating_sub(found[0]);
    ConfidenceInterval {
        p10: found[0],
        p25: found[1],
        p50: found[2],
        p75: found[3],
        p90: found[4],
        high_variance: width > HIGH_VARIANCE_WIDTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ln_gamma_matches_known_values() {
        // Γ(1) = Γ(2) = 1, Γ(5) = 24, Γ(0.5) = sqrt(pi)
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!(ln_gamma(2.0).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-9);
        assert!((ln_gamma(0.5) - 0.5 * std::f64::consts::PI.ln()).abs() < 1e-9);
    }

    #[test]
    fn poisson_degenerate_lambda_collapses_to_zero() {
        assert_eq!(poisson_pmf(0, 0.0), 1.0);
        assert_eq!(poisson_pmf(3, 0.0), 0.0);
        assert_eq!(poisson_pmf(-1, 4.0), 0.0);
    }

    #[test]
    fn poisson_partial_sums_converge_to_one() {
        let lambda = 4.7;
        let mut prev = 0.0;
        for k_max in 0..60 {
            let s = cdf(k_max, lambda, 0.0, false);
            assert!(s >= prev);
            assert!((0.0..=1.0).contains(&s));
            prev = s;
        }
        assert!((prev - 1.0).abs() < 1e-9);
    }

    #[test]
    fn negbin_invalid_params_are_probability_zero() {
        assert_eq!(neg_binomial_pmf(2, 0.0, 0.5), 0.0);
        assert_eq!(neg_binomial_pmf(2, -1.0, 0.5), 0.0);
        assert_eq!(neg_binomial_pmf(2, 3.0, 0.0), 0.0);
        assert_eq!(neg_binomial_pmf(2, 3.0, 1.0), 0.0);
        assert_eq!(neg_binomial_pmf(-2, 3.0, 0.5), 0.0);
    }

    #[test]
    fn negbin_mean_matches_lambda_and_variance_exceeds_poisson() {
        let lambda = 5.2;
        let r = 3.0;
        let p = negbin_p(lambda, r);

        let mut mean = 0.0;
        let mut m2 = 0.0;
        for k in 0..400 {
            let prob = neg_binomial_pmf(k, r, p);
            mean += k as f64 * prob;
            m2 += (k as f64) * (k as f64) * prob;
        }
        let var = m2 - mean * mean;

        assert!((mean - lambda).abs() < 0.05);
        // Var = λ + λ²/r for finite r, strictly above Poisson's λ.
        assert!(var > lambda);
        assert!((var - (lambda + lambda * lambda / r)).abs() < 0.2);
    }

    #[test]
    fn negbin_p_is_clamped() {
        assert_eq!(negbin_p(0.0, 3.0), 0.999);
        assert_eq!(negbin_p(-1.0, 3.0), 0.999);
        let p = negbin_p(5.0, 3.0);
        assert!((p - 3.0 / 8.0).abs() < 1e-12);
        assert!(negbin_p(1e9, 3.0) >= 0.001);
    }

    #[test]
    fn cdf_is_monotone_and_bounded() {
        let mut prev = 0.0;
        for k in 0..40 {
            let c = cdf(k, 5.0, 3.0, true);
            assert!(c >= prev - 1e-12);
            assert!((0.0..=1.0).contains(&c));
            prev = c;
        }
    }

    #[test]
    fn percentiles_are_ordered() {
        for &(lambda, r, negbin) in &[(4.5, 3.0, true), (2.0, 2.3, true), (8.0, 0.0, false)] {
            let ci = percentiles(lambda, r, negbin);
            assert!(ci.p10 <= ci.p25);
            assert!(ci.p25 <= ci.p50);
            assert!(ci.p50 <= ci.p75);
            assert!(ci.p75 <= ci.p90);
        }
    }

    #[test]
    fn high_variance_flag_tracks_interval_width() {
        // Tiny r blows the variance up; a tight Poisson stays narrow.
        let wide = percentiles(6.0, 0.8, true);
        assert_eq!(wide.high_variance, wide.width() > 6);
        assert!(wide.high_variance);

        let narrow = percentiles(3.0, 0.0, false);
        assert_eq!(narrow.high_variance, narrow.width() > 6);
        assert!(!narrow.high_variance);
    }
}
