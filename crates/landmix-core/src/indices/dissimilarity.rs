use crate::error::Result;
use crate::field::GridField;

/// Two-group dissimilarity index `0.5 · Σ |a_i/A − b_i/B|`, in `[0, 1]`.
///
/// 0 when both fields are distributed identically, 1 when they never
/// share a cell. NaN if either field has zero mass.
pub fn dissimilarity(a: &GridField, b: &GridField) -> Result<f64> {
    a.ensure_same_shape(b)?;
    let (ta, tb) = (a.sum(), b.sum());
    if ta == 0.0 || tb == 0.0 || !ta.is_finite() || !tb.is_finite() {
        return Ok(f64::NAN);
    }
    let total: f64 = a.data.iter().zip(&b.data).map(|(x, y)| (x / ta - y / tb).abs()).sum();
    Ok(0.5 * total)
}
