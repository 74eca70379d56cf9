//! Regular lon/lat grid over a bounding box.
//!
//! Axes are evenly spaced over the half-open interval `[min, max)`, as
//! `min + i·step`; the grid is the outer product of the longitude axis
//! (columns) and the latitude axis (rows). A step given in metres is turned
//! into per-axis degree steps at the bbox centroid (see
//! [`degree_step_at`]).

use serde::{Deserialize, Serialize};

use crate::coords::{degree_step_at, BoundingBox, DegreeStep};
use crate::error::{LumError, Result};
use crate::field::GridField;

/// Upper bound on cells along one axis.
const MAX_AXIS_LEN: usize = 100_000;

/// Requested spacing between grid nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStep {
    /// Same step in degrees on both axes.
    Degrees(f64),
    /// Physical step in metres, converted at the bbox centroid.
    Meters(f64),
    /// Exactly `rows × cols` nodes spread evenly over `[min, max)`.
    Cells { rows: usize, cols: usize },
}

impl Default for GridStep {
    fn default() -> Self {
        GridStep::Degrees(0.0015)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub bbox: BoundingBox,
    pub step: DegreeStep,
    /// Longitude of each column.
    pub lon_axis: Vec<f64>,
    /// Latitude of each row.
    pub lat_axis: Vec<f64>,
}

impl Grid {
    pub fn rows(&self) -> usize {
        self.lat_axis.len()
    }

    pub fn cols(&self) -> usize {
        self.lon_axis.len()
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(lon, lat)` of the node at `(row, col)`.
    #[inline]
    pub fn coord(&self, row: usize, col: usize) -> (f64, f64) {
        (self.lon_axis[col], self.lat_axis[row])
    }

    /// Row-major `(lon, lat)` of every node.
    pub fn coords(&self) -> Vec<(f64, f64)> {
        self.lat_axis
            .iter()
            .flat_map(|&lat| self.lon_axis.iter().map(move |&lon| (lon, lat)))
            .collect()
    }

    /// Longitude matrix (`xx` of a meshgrid).
    pub fn xx(&self) -> GridField {
        let data = (0..self.rows()).flat_map(|_| self.lon_axis.iter().copied()).collect();
        GridField { data, width: self.cols(), height: self.rows() }
    }

    /// Latitude matrix (`yy` of a meshgrid).
    pub fn yy(&self) -> GridField {
        let cols = self.cols();
        let data = self.lat_axis.iter().flat_map(|&lat| std::iter::repeat(lat).take(cols)).collect();
        GridField { data, width: cols, height: self.rows() }
    }

    /// A zero field with this grid's shape.
    pub fn zeros(&self) -> GridField {
        GridField::zeros(self.cols(), self.rows())
    }
}

/// Discretize `bbox` into a regular grid with the given step.
///
/// Identical inputs always give a bit-identical grid.
pub fn build_grid(bbox: &BoundingBox, step: GridStep) -> Result<Grid> {
    let step = match step {
        GridStep::Degrees(deg) => {
            if !(deg.is_finite() && deg > 0.0) {
                return Err(LumError::InvalidStep(format!("{deg}° is not a positive step")));
            }
            DegreeStep { lat: deg, lon: deg }
        }
        GridStep::Meters(m) => degree_step_at(bbox.centroid(), m)?,
        GridStep::Cells { rows, cols } => return cell_grid(bbox, rows, cols),
    };

    let lon_axis = axis(bbox.lon_min, bbox.lon_max, step.lon)?;
    let lat_axis = axis(bbox.lat_min, bbox.lat_max, step.lat)?;
    if lon_axis.is_empty() || lat_axis.is_empty() {
        return Err(LumError::InvalidBoundingBox("zero extent on at least one axis".into()));
    }

    log::debug!(
        "grid {}x{} (step {:.6}° lat, {:.6}° lon)",
        lat_axis.len(),
        lon_axis.len(),
        step.lat,
        step.lon
    );

    Ok(Grid { bbox: *bbox, step, lon_axis, lat_axis })
}

fn cell_grid(bbox: &BoundingBox, rows: usize, cols: usize) -> Result<Grid> {
    if rows == 0 || cols == 0 || rows > MAX_AXIS_LEN || cols > MAX_AXIS_LEN {
        return Err(LumError::InvalidStep(format!("{rows}x{cols} is not a usable grid shape")));
    }
    if bbox.lat_extent() <= 0.0 || bbox.lon_extent() <= 0.0 {
        return Err(LumError::InvalidBoundingBox("zero extent on at least one axis".into()));
    }
    let step = DegreeStep { lat: bbox.lat_extent() / rows as f64, lon: bbox.lon_extent() / cols as f64 };
    let lon_axis = (0..cols).map(|i| bbox.lon_min + i as f64 * step.lon).collect();
    let lat_axis = (0..rows).map(|i| bbox.lat_min + i as f64 * step.lat).collect();
    Ok(Grid { bbox: *bbox, step, lon_axis, lat_axis })
}

/// Evenly spaced values in `[min, max)`.
fn axis(min: f64, max: f64, step: f64) -> Result<Vec<f64>> {
    let n = ((max - min) / step).ceil().max(0.0);
    if n > MAX_AXIS_LEN as f64 {
        return Err(LumError::InvalidStep(format!(
            "step {step} over [{min}, {max}) gives more than {MAX_AXIS_LEN} cells"
        )));
    }
    Ok((0..n as usize)
        .map(|i| min + i as f64 * step)
        .filter(|&v| v < max)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> BoundingBox {
        BoundingBox::new(48.84, 2.33, 48.87, 2.37).unwrap()
    }

    #[test]
    fn axes_are_half_open() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 2.0).unwrap();
        let grid = build_grid(&bbox, GridStep::Degrees(0.5)).unwrap();
        assert_eq!(grid.lon_axis, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(grid.lat_axis, vec![0.0, 0.5]);
        assert_eq!(grid.shape(), (2, 4));
    }

    #[test]
    fn cell_count_matches_extent_over_step() {
        let bbox = paris();
        let grid = build_grid(&bbox, GridStep::Degrees(0.0015)).unwrap();
        let expected_rows = (bbox.lat_extent() / 0.0015).ceil() as usize;
        let expected_cols = (bbox.lon_extent() / 0.0015).ceil() as usize;
        assert!(grid.rows().abs_diff(expected_rows) <= 1);
        assert!(grid.cols().abs_diff(expected_cols) <= 1);
    }

    #[test]
    fn meter_step_grid_is_bit_identical_across_calls() {
        let a = build_grid(&paris(), GridStep::Meters(100.0)).unwrap();
        let b = build_grid(&paris(), GridStep::Meters(100.0)).unwrap();
        assert_eq!(a.shape(), b.shape());
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.lon_axis), bits(&b.lon_axis));
        assert_eq!(bits(&a.lat_axis), bits(&b.lat_axis));
    }

    #[test]
    fn meter_step_uses_wider_longitude_step() {
        let grid = build_grid(&paris(), GridStep::Meters(100.0)).unwrap();
        assert!(grid.step.lon > grid.step.lat);
        // ~0.03° of latitude at 100 m per row.
        assert!(grid.rows() >= 33 && grid.rows() <= 35, "rows = {}", grid.rows());
    }

    #[test]
    fn meshgrid_matrices_follow_axes() {
        let grid = build_grid(&paris(), GridStep::Degrees(0.01)).unwrap();
        let (xx, yy) = (grid.xx(), grid.yy());
        assert_eq!(xx.shape(), grid.shape());
        assert_eq!(yy.shape(), grid.shape());
        for r in 0..grid.rows() {
            for c in 0..grid.cols() {
                assert_eq!((xx.get(r, c), yy.get(r, c)), grid.coord(r, c));
            }
        }
        assert_eq!(grid.coords()[grid.cols() + 1], grid.coord(1, 1));
    }

    #[test]
    fn explicit_cell_counts_are_exact() {
        let grid = build_grid(&paris(), GridStep::Cells { rows: 50, cols: 50 }).unwrap();
        assert_eq!(grid.shape(), (50, 50));
        assert_eq!(grid.lon_axis[0], 2.33);
        assert!(*grid.lat_axis.last().unwrap() < 48.87);
        assert!(matches!(
            build_grid(&paris(), GridStep::Cells { rows: 0, cols: 5 }),
            Err(LumError::InvalidStep(_))
        ));
    }

    #[test]
    fn invalid_steps_are_rejected() {
        assert!(matches!(build_grid(&paris(), GridStep::Degrees(0.0)), Err(LumError::InvalidStep(_))));
        assert!(matches!(build_grid(&paris(), GridStep::Meters(f64::NAN)), Err(LumError::InvalidStep(_))));
        assert!(matches!(build_grid(&paris(), GridStep::Degrees(1e-9)), Err(LumError::InvalidStep(_))));
    }

    #[test]
    fn zero_extent_bbox_is_rejected() {
        let flat = BoundingBox::new(48.85, 2.33, 48.85, 2.37).unwrap();
        assert!(matches!(
            build_grid(&flat, GridStep::Degrees(0.01)),
            Err(LumError::InvalidBoundingBox(_))
        ));
    }
}
