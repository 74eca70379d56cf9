//! Land-use-mix grid from an activity and a residential density.
//!
//! Each cell is `phi(activity, residential)` for a metric chosen by name from
//! a [`PhiRegistry`]. A metric returns `None` where it divides by zero; the
//! cell is then handled per [`ZeroDivisionPolicy`] and listed in the grid's
//! skip-list.

use std::collections::BTreeMap;
use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use crate::config::ZeroDivisionPolicy;
use crate::error::{LumError, Result};
use crate::field::GridField;

/// Two-argument mixity function. `None` signals a division by zero.
pub type PhiFn = fn(f64, f64) -> Option<f64>;

// ── Metrics ───────────────────────────────────────────────────────────────────

/// Shares `(x, y) / (x + y)`, or `None` unless both inputs are positive.
fn shares(x: f64, y: f64) -> Option<(f64, f64)> {
    if x > 0.0 && y > 0.0 {
        Some((x / (x + y), y / (x + y)))
    } else {
        None
    }
}

/// `|x − y|^0.75`.
pub fn phi(x: f64, y: f64) -> Option<f64> {
    Some((x - y).abs().powf(0.75))
}

/// Two-class Shannon entropy in bits, in `[0, 1]`. 0 when either input is ≤ 0.
///
/// Evaluated on the shares `p = x/(x+y)` and `q = y/(x+y)`, not on the raw
/// densities: `−(p·ln p + q·ln q)/ln 2`.
pub fn phi_entropy(x: f64, y: f64) -> Option<f64> {
    Some(match shares(x, y) {
        Some((p, q)) => (-(p * p.ln() + q * q.ln()) / LN_2).max(0.0),
        None => 0.0,
    })
}

/// `1 − |x − y| / (x + y)`.
pub fn phi_balance_index(x: f64, y: f64) -> Option<f64> {
    let total = x + y;
    (total != 0.0).then(|| 1.0 - (x - y).abs() / total)
}

/// `2 · min(x, y) / (x + y)`.
pub fn phi_sorensen(x: f64, y: f64) -> Option<f64> {
    let total = x + y;
    (total != 0.0).then(|| 2.0 * x.min(y) / total)
}

/// `min(x, y) / (x + y − min(x, y))`.
pub fn phi_jaccard(x: f64, y: f64) -> Option<f64> {
    let min = x.min(y);
    let union = x + y - min;
    (union != 0.0).then(|| min / union)
}

/// Rényi entropy of order α = −2 over the cell's shares:
/// `ln(p^α + q^α) / (1 − α)`. 0 when either input is ≤ 0.
///
/// `p^α` overflows for shares below ~1e-154, so the sum is taken in log
/// space.
pub fn phi_generalized_entropy_alpha(x: f64, y: f64) -> Option<f64> {
    const ALPHA: f64 = -2.0;
    if !(x > 0.0 && y > 0.0) {
        return Some(0.0);
    }
    let ln_total = (x + y).ln();
    let a = ALPHA * (x.ln() - ln_total);
    let b = ALPHA * (y.ln() - ln_total);
    let m = a.max(b);
    Some((m + ((a - m).exp() + (b - m).exp()).ln()) / (1.0 - ALPHA))
}

/// Hill number of order q = 0.5 over the cell's shares:
/// `(p^q + r^q)^(1/(1−q))`, in `[1, 2]`. 0 when either input is ≤ 0.
pub fn phi_true_diversity(x: f64, y: f64) -> Option<f64> {
    const Q: f64 = 0.5;
    Some(match shares(x, y) {
        Some((p, r)) => (p.powf(Q) + r.powf(Q)).powf(1.0 / (1.0 - Q)),
        None => 0.0,
    })
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Name → metric lookup. `Default` holds the built-in metrics.
#[derive(Debug, Clone)]
pub struct PhiRegistry {
    metrics: BTreeMap<String, PhiFn>,
}

impl Default for PhiRegistry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register("phi", phi);
        r.register("phi_entropy", phi_entropy);
        r.register("phi_balance_index", phi_balance_index);
        r.register("phi_sorensen", phi_sorensen);
        r.register("phi_jaccard", phi_jaccard);
        r.register("phi_generalized_entropy_alpha", phi_generalized_entropy_alpha);
        r.register("phi_true_diversity", phi_true_diversity);
        r
    }
}

impl PhiRegistry {
    pub fn empty() -> Self {
        Self { metrics: BTreeMap::new() }
    }

    /// Add or replace a metric.
    pub fn register(&mut self, name: &str, f: PhiFn) {
        self.metrics.insert(name.to_string(), f);
    }

    pub fn get(&self, name: &str) -> Result<PhiFn> {
        self.metrics.get(name).copied().ok_or_else(|| LumError::UnknownMetric(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Apply metric `name` to one pair.
    pub fn evaluate(&self, name: &str, x: f64, y: f64) -> Result<f64> {
        let f = self.get(name)?;
        f(x, y).ok_or_else(|| LumError::DivisionByZero { metric: name.to_string() })
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LumOptions {
    pub zero_division: ZeroDivisionPolicy,
    /// Divide every cell by the grid's own finite sum.
    pub normalize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LumGrid {
    pub field: GridField,
    pub metric: String,
    /// `(row, col)` of every cell where the metric divided by zero.
    pub skipped: Vec<(usize, usize)>,
}

/// Cell-by-cell `metric(activity, residential)`.
///
/// Unknown metric names and mismatched shapes fail immediately; zero
/// divisions are per-cell and never abort.
pub fn compute_lum(
    activity: &GridField,
    residential: &GridField,
    metric: &str,
    registry: &PhiRegistry,
    opts: LumOptions,
) -> Result<LumGrid> {
    let f = registry.get(metric)?;
    activity.ensure_same_shape(residential)?;

    let mut field = GridField::zeros(activity.width, activity.height);
    let mut skipped = Vec::new();
    for (i, (&x, &y)) in activity.data.iter().zip(&residential.data).enumerate() {
        field.data[i] = match f(x, y) {
            Some(v) => v,
            None => {
                skipped.push((i / activity.width, i % activity.width));
                match opts.zero_division {
                    ZeroDivisionPolicy::Skip => f64::NAN,
                    ZeroDivisionPolicy::TreatAsZero => 0.0,
                }
            }
        };
    }
    if !skipped.is_empty() {
        log::warn!("{metric}: {} cell(s) divided by zero ({:?})", skipped.len(), opts.zero_division);
    }

    if opts.normalize {
        match field.normalized() {
            Some(n) => field = n,
            None => log::warn!("{metric}: LUM grid sums to zero, left unnormalized"),
        }
    }

    Ok(LumGrid { field, metric: metric.to_string(), skipped })
}

/// City-level mixity: mean over the grid's finite cells. NaN if none.
pub fn compute_phi_summary(lum: &LumGrid) -> f64 {
    let finite: Vec<f64> = lum.field.data.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.iter().sum::<f64>() / finite.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn samples() -> Vec<f64> {
        (1..=20).map(|i| i as f64 / 20.0).chain([1e-9, 1e-4, 0.333]).collect()
    }

    #[test]
    fn entropy_is_symmetric_and_bounded() {
        for &x in &samples() {
            for &y in &samples() {
                let a = phi_entropy(x, y).unwrap();
                let b = phi_entropy(y, x).unwrap();
                assert_abs_diff_eq!(a, b, epsilon = 1e-12);
                assert!((0.0..=1.0 + 1e-12).contains(&a), "phi_entropy({x}, {y}) = {a}");
            }
        }
        assert_abs_diff_eq!(phi_entropy(0.3, 0.3).unwrap(), 1.0, epsilon = 1e-12);
        // Shares, not raw values: balance gives 1 at any density level.
        assert_abs_diff_eq!(phi_entropy(1e-6, 1e-6).unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(phi_entropy(0.0, 0.5), Some(0.0));
        assert_eq!(phi_entropy(-1.0, 0.5), Some(0.0));
    }

    #[test]
    fn balance_and_overlap_indices_are_in_unit_interval() {
        for &x in &samples() {
            for &y in &samples() {
                for f in [phi_balance_index, phi_sorensen, phi_jaccard] {
                    let v = f(x, y).unwrap();
                    assert!((0.0..=1.0 + 1e-12).contains(&v));
                }
            }
        }
        assert_eq!(phi_balance_index(0.2, 0.2), Some(1.0));
        assert_eq!(phi_jaccard(0.2, 0.4), Some(0.5));
        assert_abs_diff_eq!(phi_sorensen(0.2, 0.6).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn zero_sum_pairs_signal_division_by_zero() {
        assert_eq!(phi_balance_index(0.0, 0.0), None);
        assert_eq!(phi_sorensen(0.0, 0.0), None);
        assert_eq!(phi_jaccard(0.0, 0.0), None);
        let reg = PhiRegistry::default();
        assert!(matches!(
            reg.evaluate("phi_sorensen", 0.0, 0.0),
            Err(LumError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn diversity_metrics_peak_at_balance() {
        assert_abs_diff_eq!(phi_true_diversity(0.1, 0.1).unwrap(), 2.0, epsilon = 1e-12);
        assert!(phi_true_diversity(0.1, 0.9).unwrap() < 2.0);
        assert!(phi_true_diversity(0.1, 0.9).unwrap() >= 1.0);
        // α < 0 penalizes imbalance: smallest at p = q = 1/2, where it is ln 2.
        assert_abs_diff_eq!(phi_generalized_entropy_alpha(0.4, 0.4).unwrap(), LN_2, epsilon = 1e-12);
        assert!(phi_generalized_entropy_alpha(0.1, 0.9).unwrap() > LN_2);
        assert_abs_diff_eq!(phi(0.5, 0.1).unwrap(), 0.4f64.powf(0.75), epsilon = 1e-12);
    }

    #[test]
    fn generalized_entropy_stays_finite_on_tiny_shares() {
        // q ≈ 1e-157, so the value is ≈ −2·ln q / 3.
        let v = phi_generalized_entropy_alpha(1e-3, 1e-160).unwrap();
        assert_abs_diff_eq!(v, 2.0 * 157.0 * std::f64::consts::LN_10 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(
            phi_generalized_entropy_alpha(1e-160, 1e-3).unwrap(),
            v,
            epsilon = 1e-9
        );

        let reg = PhiRegistry::default();
        let a = GridField::from_vec(2, 1, vec![1e-3, 0.5]).unwrap();
        let b = GridField::from_vec(2, 1, vec![1e-160, 0.5]).unwrap();
        let lum = compute_lum(&a, &b, "phi_generalized_entropy_alpha", &reg, LumOptions::default()).unwrap();
        assert!(lum.field.data.iter().all(|v| v.is_finite()));
        assert!(lum.skipped.is_empty());
        assert_abs_diff_eq!(compute_phi_summary(&lum), (v + LN_2) / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn registry_lookup_and_extension() {
        let mut reg = PhiRegistry::default();
        assert!(reg.names().any(|n| n == "phi_true_diversity"));
        assert!(matches!(reg.get("phi_nope"), Err(LumError::UnknownMetric(_))));
        reg.register("phi_max", |x, y| Some(x.max(y)));
        assert_eq!(reg.evaluate("phi_max", 0.2, 0.7).unwrap(), 0.7);
    }

    #[test]
    fn compute_lum_rejects_misconfiguration() {
        let reg = PhiRegistry::default();
        let a = GridField::new(3, 2, 0.1);
        let b = GridField::new(2, 3, 0.1);
        assert!(matches!(
            compute_lum(&a, &a, "nope", &reg, LumOptions::default()),
            Err(LumError::UnknownMetric(_))
        ));
        assert!(matches!(
            compute_lum(&a, &b, "phi", &reg, LumOptions::default()),
            Err(LumError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn zero_division_policy_is_applied_per_cell() {
        let reg = PhiRegistry::default();
        let a = GridField::from_vec(2, 2, vec![0.0, 0.2, 0.3, 0.0]).unwrap();
        let b = GridField::from_vec(2, 2, vec![0.0, 0.2, 0.1, 0.0]).unwrap();

        let skip = compute_lum(&a, &b, "phi_balance_index", &reg, LumOptions::default()).unwrap();
        assert_eq!(skip.skipped, vec![(0, 0), (1, 1)]);
        assert!(skip.field.get(0, 0).is_nan());
        assert_eq!(skip.field.get(0, 1), 1.0);
        assert_abs_diff_eq!(compute_phi_summary(&skip), 0.75, epsilon = 1e-12);

        let zero = LumOptions { zero_division: ZeroDivisionPolicy::TreatAsZero, normalize: false };
        let z = compute_lum(&a, &b, "phi_balance_index", &reg, zero).unwrap();
        assert_eq!(z.skipped.len(), 2);
        assert_eq!(z.field.get(1, 1), 0.0);
        assert_abs_diff_eq!(compute_phi_summary(&z), 0.375, epsilon = 1e-12);
    }

    #[test]
    fn normalized_lum_sums_to_one() {
        let reg = PhiRegistry::default();
        let a = GridField::from_vec(3, 1, vec![0.2, 0.3, 0.5]).unwrap();
        let b = GridField::from_vec(3, 1, vec![0.5, 0.3, 0.2]).unwrap();
        let opts = LumOptions { normalize: true, ..LumOptions::default() };
        let lum = compute_lum(&a, &b, "phi_entropy", &reg, opts).unwrap();
        assert_abs_diff_eq!(lum.field.sum(), 1.0, epsilon = 1e-12);
        assert!(lum.skipped.is_empty());
    }
}
