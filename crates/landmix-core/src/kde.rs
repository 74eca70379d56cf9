//! Bivariate Gaussian kernel density estimation on a grid.
//!
//! The estimator is a product kernel with an independent bandwidth per axis:
//!
//!   f(x, y) = 1/n · Σ_i φ((x − x_i)/h_lon)/h_lon · φ((y − y_i)/h_lat)/h_lat
//!
//! Bandwidths come either from Scott's rule (`h = σ · n^(-1/6)`, σ the
//! population standard deviation of the axis) or from a walkable distance
//! converted to degrees at the grid centroid.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::{BandwidthPolicy, DEFAULT_WALKABLE_METERS};
use crate::coords::degree_step_at;
use crate::error::{LumError, Result};
use crate::feature::{Category, ClassifiedPoi};
use crate::field::GridField;
use crate::grid::Grid;

/// Label under which the all-activities density is reported.
pub const ACTIVITY_AGGREGATE: &str = "activity";

/// Kernel width per axis, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bandwidth {
    pub lon: f64,
    pub lat: f64,
}

pub(crate) fn distinct_points(points: &[(f64, f64)]) -> usize {
    points
        .iter()
        .map(|&(lon, lat)| (lon.to_bits(), lat.to_bits()))
        .collect::<BTreeSet<_>>()
        .len()
}

fn population_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    let mean = values.clone().sum::<f64>() / n;
    (values.map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn ensure_distinct(points: &[(f64, f64)], label: &str) -> Result<()> {
    let distinct = distinct_points(points);
    if distinct < 2 {
        return Err(LumError::InsufficientData { category: label.to_string(), distinct });
    }
    Ok(())
}

fn usable(h: f64) -> bool {
    h > 0.0 && h.is_finite()
}

/// Scott's rule bandwidth. Needs at least two distinct points.
///
/// An axis without spread (all points on one meridian or parallel) takes
/// the other axis's width. `None` when neither axis yields a usable width.
pub fn scott_bandwidth(points: &[(f64, f64)], label: &str) -> Result<Option<Bandwidth>> {
    ensure_distinct(points, label)?;
    let factor = (points.len() as f64).powf(-1.0 / 6.0);
    let lon = population_std(points.iter().map(|p| p.0)) * factor;
    let lat = population_std(points.iter().map(|p| p.1)) * factor;
    Ok(match (usable(lon), usable(lat)) {
        (true, true) => Some(Bandwidth { lon, lat }),
        (true, false) => Some(Bandwidth { lon, lat: lon }),
        (false, true) => Some(Bandwidth { lon: lat, lat }),
        (false, false) => None,
    })
}

fn walkable_bandwidth(grid: &Grid, meters: f64) -> Result<Bandwidth> {
    let step = degree_step_at(grid.bbox.centroid(), meters)?;
    Ok(Bandwidth { lon: step.lon, lat: step.lat })
}

/// Bandwidth for `points` under `policy`.
pub fn select_bandwidth(points: &[(f64, f64)], grid: &Grid, policy: BandwidthPolicy, label: &str) -> Result<Bandwidth> {
    match policy {
        BandwidthPolicy::Scott => match scott_bandwidth(points, label)? {
            Some(bw) => Ok(bw),
            None => {
                log::debug!("{label}: no spread for Scott's rule, using {DEFAULT_WALKABLE_METERS} m");
                walkable_bandwidth(grid, DEFAULT_WALKABLE_METERS)
            }
        },
        BandwidthPolicy::Walkable { meters } => {
            ensure_distinct(points, label)?;
            walkable_bandwidth(grid, meters)
        }
    }
}

#[inline]
fn gaussian(u: f64) -> f64 {
    (-0.5 * u * u).exp() / (2.0 * PI).sqrt()
}

/// Raw (unnormalized) density at every grid node.
pub fn evaluate_kde(points: &[(f64, f64)], grid: &Grid, bw: Bandwidth) -> GridField {
    let mut field = grid.zeros();
    if points.is_empty() {
        return field;
    }
    let scale = 1.0 / (points.len() as f64 * bw.lon * bw.lat);
    let cols = grid.cols();

    let fill_row = |(row, out): (usize, &mut [f64])| {
        let lat = grid.lat_axis[row];
        // The latitude factor is shared by every cell of the row.
        let lat_k: Vec<f64> = points.iter().map(|p| gaussian((lat - p.1) / bw.lat)).collect();
        for (col, cell) in out.iter_mut().enumerate() {
            let lon = grid.lon_axis[col];
            let s: f64 = points
                .iter()
                .zip(&lat_k)
                .map(|(p, ky)| gaussian((lon - p.0) / bw.lon) * ky)
                .sum();
            *cell = s * scale;
        }
    };

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        field.data.par_chunks_mut(cols).enumerate().for_each(fill_row);
    }
    #[cfg(not(feature = "threading"))]
    field.data.chunks_mut(cols).enumerate().for_each(fill_row);

    field
}

/// Density of one point set over `grid`.
///
/// With `normalize`, the cells are divided by their sum so the result
/// sums to 1; a density that vanishes everywhere is then an error.
pub fn estimate_density(
    points: &[(f64, f64)],
    grid: &Grid,
    policy: BandwidthPolicy,
    normalize: bool,
    label: &str,
) -> Result<GridField> {
    let bw = select_bandwidth(points, grid, policy, label)?;
    log::debug!("{label}: {} points, bandwidth {:.6}° lon × {:.6}° lat", points.len(), bw.lon, bw.lat);
    let raw = evaluate_kde(points, grid, bw);
    if !normalize {
        return Ok(raw);
    }
    raw.normalized().ok_or_else(|| LumError::EmptyDensity { category: label.to_string() })
}

/// A category whose density could not be estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCategory {
    pub category: String,
    pub reason: String,
}

/// Per-category densities plus the all-activities aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DensitySet {
    pub by_category: BTreeMap<Category, GridField>,
    /// Density of every non-residential POI together.
    pub activity: Option<GridField>,
    pub skipped: Vec<SkippedCategory>,
}

impl DensitySet {
    pub fn residential(&self) -> Option<&GridField> {
        self.by_category.get(&Category::Residential)
    }
}

fn record_skip(skipped: &mut Vec<SkippedCategory>, label: &str, err: LumError) {
    log::warn!("skipping density for {label}: {err}");
    skipped.push(SkippedCategory { category: label.to_string(), reason: err.to_string() });
}

/// Estimate a density for every category present in `pois`.
///
/// Categories that cannot be fitted are skipped and reported, never fatal.
/// Only a grid-level problem (such as an invalid walkable distance) aborts.
pub fn estimate_density_by_category(
    pois: &[ClassifiedPoi],
    grid: &Grid,
    policy: BandwidthPolicy,
    normalize: bool,
) -> Result<DensitySet> {
    let mut groups: BTreeMap<Category, Vec<(f64, f64)>> = BTreeMap::new();
    for poi in pois {
        groups.entry(poi.category).or_default().push((poi.lon, poi.lat));
    }
    let activity_points: Vec<(f64, f64)> =
        pois.iter().filter(|p| p.category.is_activity()).map(|p| (p.lon, p.lat)).collect();

    let mut set = DensitySet::default();
    for (category, points) in &groups {
        match estimate_density(points, grid, policy, normalize, category.as_str()) {
            Ok(f) => {
                set.by_category.insert(*category, f);
            }
            Err(e @ (LumError::InsufficientData { .. } | LumError::EmptyDensity { .. })) => {
                record_skip(&mut set.skipped, category.as_str(), e)
            }
            Err(e) => return Err(e),
        }
    }

    set.activity = match set.by_category.get(&Category::Activity) {
        Some(f) => Some(f.clone()),
        None => match estimate_density(&activity_points, grid, policy, normalize, ACTIVITY_AGGREGATE) {
            Ok(f) => Some(f),
            Err(e @ (LumError::InsufficientData { .. } | LumError::EmptyDensity { .. })) => {
                record_skip(&mut set.skipped, ACTIVITY_AGGREGATE, e);
                None
            }
            Err(e) => return Err(e),
        },
    };

    log::info!(
        "estimated {} category densities on a {}x{} grid, {} skipped",
        set.by_category.len(),
        grid.rows(),
        grid.cols(),
        set.skipped.len()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::BoundingBox;
    use crate::grid::{build_grid, GridStep};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn grid() -> Grid {
        let bbox = BoundingBox::new(48.84, 2.33, 48.87, 2.37).unwrap();
        build_grid(&bbox, GridStep::Degrees(0.001)).unwrap()
    }

    fn cluster(rng: &mut StdRng, lon: f64, lat: f64, n: usize, spread: f64) -> Vec<(f64, f64)> {
        (0..n)
            .map(|_| (lon + rng.gen_range(-spread..spread), lat + rng.gen_range(-spread..spread)))
            .collect()
    }

    fn poi(id: u64, (lon, lat): (f64, f64), category: Category) -> ClassifiedPoi {
        ClassifiedPoi { id, lon, lat, category, key: String::new(), value: String::new() }
    }

    #[test]
    fn normalized_density_sums_to_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let g = grid();
        for n in [2, 5, 40] {
            let pts = cluster(&mut rng, 2.35, 48.855, n, 0.004);
            let f = estimate_density(&pts, &g, BandwidthPolicy::Scott, true, "test").unwrap();
            assert!((f.sum() - 1.0).abs() < 1e-5, "n = {n}, sum = {}", f.sum());
            assert!(f.min_value() >= 0.0);
        }
        let pts = cluster(&mut rng, 2.35, 48.855, 10, 0.004);
        let f = estimate_density(&pts, &g, BandwidthPolicy::Walkable { meters: 400.0 }, true, "test").unwrap();
        assert!((f.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn density_peaks_near_the_cluster() {
        let mut rng = StdRng::seed_from_u64(3);
        let g = grid();
        let pts = cluster(&mut rng, 2.34, 48.85, 15, 0.001);
        let f = estimate_density(&pts, &g, BandwidthPolicy::Walkable { meters: 300.0 }, true, "x").unwrap();
        let near = f.get(10, 10); // (2.34, 48.85)
        let far = f.get(25, 35); // (2.365, 48.865)
        assert!(near > 100.0 * far, "near {near}, far {far}");
    }

    #[test]
    fn scott_bandwidth_matches_rule() {
        let pts = [(0.0, 0.0), (2.0, 4.0)];
        let bw = scott_bandwidth(&pts, "x").unwrap().unwrap();
        let factor = 2f64.powf(-1.0 / 6.0);
        assert_abs_diff_eq!(bw.lon, 1.0 * factor, epsilon = 1e-12);
        assert_abs_diff_eq!(bw.lat, 2.0 * factor, epsilon = 1e-12);
    }

    #[test]
    fn flat_axis_borrows_the_other_bandwidth() {
        let bw = scott_bandwidth(&[(0.0, 5.0), (2.0, 5.0)], "x").unwrap().unwrap();
        assert_eq!(bw.lat, bw.lon);
        assert!(bw.lon > 0.0);
        let bw = scott_bandwidth(&[(1.0, 0.0), (1.0, 4.0)], "x").unwrap().unwrap();
        assert_eq!(bw.lon, bw.lat);
    }

    #[test]
    fn collinear_points_still_yield_a_density() {
        let g = grid();
        let along_parallel = [(2.34, 48.85), (2.36, 48.85), (2.35, 48.85)];
        let along_meridian = [(2.35, 48.85), (2.35, 48.86)];
        for pts in [&along_parallel[..], &along_meridian[..]] {
            let f = estimate_density(pts, &g, BandwidthPolicy::Scott, true, "shop").unwrap();
            assert!((f.sum() - 1.0).abs() < 1e-5, "sum = {}", f.sum());
            assert!(f.min_value() >= 0.0);
        }
    }

    #[test]
    fn fewer_than_two_distinct_points_is_insufficient() {
        let g = grid();
        let same = [(2.35, 48.85), (2.35, 48.85), (2.35, 48.85)];
        for policy in [BandwidthPolicy::Scott, BandwidthPolicy::Walkable { meters: 400.0 }] {
            assert!(matches!(
                estimate_density(&same, &g, policy, true, "shop"),
                Err(LumError::InsufficientData { distinct: 1, .. })
            ));
        }
    }

    #[test]
    fn per_category_skips_sparse_categories() {
        let mut rng = StdRng::seed_from_u64(11);
        let g = grid();
        let mut pois = Vec::new();
        for (i, p) in cluster(&mut rng, 2.34, 48.85, 10, 0.002).into_iter().enumerate() {
            pois.push(poi(i as u64, p, Category::Residential));
        }
        for (i, p) in cluster(&mut rng, 2.36, 48.86, 10, 0.002).into_iter().enumerate() {
            pois.push(poi(100 + i as u64, p, Category::Shop));
        }
        pois.push(poi(200, (2.35, 48.855), Category::LeisureAmenity));

        let set = estimate_density_by_category(&pois, &g, BandwidthPolicy::Scott, true).unwrap();
        assert!(set.residential().is_some());
        assert!(set.by_category.contains_key(&Category::Shop));
        assert!(!set.by_category.contains_key(&Category::LeisureAmenity));
        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].category, "leisure/amenity");
        let activity = set.activity.as_ref().unwrap();
        assert!((activity.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn raw_density_is_left_unnormalized() {
        let g = grid();
        let pts = [(2.34, 48.85), (2.36, 48.86)];
        let f = estimate_density(&pts, &g, BandwidthPolicy::Scott, false, "x").unwrap();
        assert!((f.sum() - 1.0).abs() > 1.0);
    }
}
