//! inference::hypothesis — likelihood-ratio and Wald-type p-values.
//!
//! - [`LikelihoodRatio`]: `LR = 2 (ℓ_model - ℓ_null)` with a χ²(df) upper
//!   tail p-value, where `df` is the number of free parameters.
//! - [`normal_p_value`]: two-sided p-value of a t-statistic under the
//!   standard normal.
//!
//! Degenerate inputs (`df = 0`, non-finite statistics) give NaN p-values
//! rather than errors.
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodRatio {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
}

impl LikelihoodRatio {
    pub fn new(model_loglike: f64, null_loglike: f64, df: usize) -> Self {
        let statistic = 2.0 * (model_loglike - null_loglike);
        let p_value = if df == 0 || !statistic.is_finite() {
            f64::NAN
        } else {
            match ChiSquared::new(df as f64) {
                Ok(chi) => 1.0 - chi.cdf(statistic.max(0.0)),
                Err(_) => f64::NAN,
            }
        };
        Self { statistic, df, p_value }
    }
}

/// `2 (1 - Φ(|t|))`.
pub fn normal_p_value(t_stat: f64) -> f64 {
    if !t_stat.is_finite() {
        return f64::NAN;
    }
    match Normal::new(0.0, 1.0) {
        Ok(n) => 2.0 * (1.0 - n.cdf(t_stat.abs())),
        Err(_) => f64::NAN,
    }
}
