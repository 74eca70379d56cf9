//! Global spatial autocorrelation: Moran's I and Geary's C.
//!
//! Weights are inverse Euclidean distances (in degrees) over every unordered
//! pair of cells, `w_ij = 1 / d_ij`, optionally zeroed beyond a cutoff. The
//! pair loop is O(N²); the cutoff and coarser grids are the levers for large
//! inputs. Cells with a non-finite value are left out.

use serde::{Deserialize, Serialize};

use crate::error::{LumError, Result};

/// Spatial weight scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialWeights {
    /// Pairs farther apart than this (degrees) get weight 0.
    pub cutoff: Option<f64>,
}

impl SpatialWeights {
    #[inline]
    fn weight(&self, a: (f64, f64), b: (f64, f64)) -> f64 {
        let d = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
        if d == 0.0 || self.cutoff.is_some_and(|c| d > c) {
            0.0
        } else {
            1.0 / d
        }
    }
}

/// Per-pair accumulations of one statistic.
#[derive(Debug, Clone, Copy, Default)]
struct PairSums {
    weight: f64,
    cross: f64,
}

/// Finite `(value, coord)` pairs after a length check.
fn finite_cells(values: &[f64], coords: &[(f64, f64)]) -> Result<(Vec<f64>, Vec<(f64, f64)>)> {
    if values.len() != coords.len() {
        return Err(LumError::ShapeMismatch {
            expected: (coords.len(), 1),
            actual: (values.len(), 1),
        });
    }
    Ok(values
        .iter()
        .zip(coords)
        .filter(|(v, _)| v.is_finite())
        .map(|(&v, &c)| (v, c))
        .unzip())
}

/// Σ over `j > i` of `weight` and `weight · term(i, j)`, summed per row `i`
/// then across rows in index order, so the result is the same with or
/// without threading.
fn pair_sums(values: &[f64], coords: &[(f64, f64)], weights: SpatialWeights, term: impl Fn(f64, f64) -> f64 + Sync) -> PairSums {
    let n = values.len();
    let row = |i: usize| -> PairSums {
        let mut s = PairSums::default();
        for j in i + 1..n {
            let w = weights.weight(coords[i], coords[j]);
            if w != 0.0 {
                s.weight += w;
                s.cross += w * term(values[i], values[j]);
            }
        }
        s
    };

    #[cfg(feature = "threading")]
    let rows: Vec<PairSums> = {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(row).collect()
    };
    #[cfg(not(feature = "threading"))]
    let rows: Vec<PairSums> = (0..n).map(row).collect();

    rows.into_iter().fold(PairSums::default(), |acc, s| PairSums {
        weight: acc.weight + s.weight,
        cross: acc.cross + s.cross,
    })
}

fn mean_and_variance_sum(values: &[f64]) -> (f64, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (mean, values.iter().map(|v| (v - mean).powi(2)).sum())
}

/// Global Moran's I. Positive for clustered values, near `−1/(N−1)` for
/// random ones. NaN for a flat field or when no pair carries weight.
pub fn moran_index(values: &[f64], coords: &[(f64, f64)], weights: SpatialWeights) -> Result<f64> {
    let (values, coords) = finite_cells(values, coords)?;
    if values.len() < 2 {
        return Ok(f64::NAN);
    }
    let (mean, denom) = mean_and_variance_sum(&values);
    let s = pair_sums(&values, &coords, weights, |a, b| (a - mean) * (b - mean));
    if denom == 0.0 || s.weight == 0.0 {
        return Ok(f64::NAN);
    }
    Ok(values.len() as f64 / s.weight * (s.cross / denom))
}

/// Global Geary's C. Below 1 for clustered values, above 1 for dispersed.
/// NaN for a flat field or when no pair carries weight.
pub fn geary_index(values: &[f64], coords: &[(f64, f64)], weights: SpatialWeights) -> Result<f64> {
    let (values, coords) = finite_cells(values, coords)?;
    if values.len() < 2 {
        return Ok(f64::NAN);
    }
    let (_, denom) = mean_and_variance_sum(&values);
    let s = pair_sums(&values, &coords, weights, |a, b| (a - b).powi(2));
    if denom == 0.0 || s.weight == 0.0 {
        return Ok(f64::NAN);
    }
    Ok(0.5 * (values.len() - 1) as f64 / s.weight * (s.cross / denom))
}

/// `1 − C`, so that positive means clustered, as for Moran's I.
pub fn adjusted_geary(values: &[f64], coords: &[(f64, f64)], weights: SpatialWeights) -> Result<f64> {
    Ok(-(geary_index(values, coords, weights)? - 1.0))
}
