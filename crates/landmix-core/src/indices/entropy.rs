//! Shannon entropy of a gridded distribution.

/// `−Σ (f_i/F)·ln(f_i/F)` with `F = Σ f_i`. Zero cells contribute nothing.
/// NaN when `F` is zero or not finite.
pub fn shannon_entropy(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if !(total.is_finite() && total != 0.0) {
        return f64::NAN;
    }
    values
        .iter()
        .map(|&v| v / total)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}

/// Shannon entropy divided by its uniform maximum `ln(N)`, in `[0, 1]` for
/// non-negative inputs. NaN for fewer than two cells.
pub fn relative_entropy(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    shannon_entropy(values) / (values.len() as f64).ln()
}
