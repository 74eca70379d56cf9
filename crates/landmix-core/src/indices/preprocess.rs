//! Node-to-cell conversions. A grid of `rows × cols` nodes bounds
//! `(rows − 1) × (cols − 1)` cells; indices over densities and counts are
//! computed per cell, located at the cell's midpoint.

use crate::field::GridField;
use crate::grid::Grid;

/// `(lon, lat)` of every cell midpoint, row-major.
pub fn midpoint_coords(grid: &Grid) -> Vec<(f64, f64)> {
    let mids = |axis: &[f64]| -> Vec<f64> { axis.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect() };
    let lon_mid = mids(&grid.lon_axis);
    let lat_mid = mids(&grid.lat_axis);
    lat_mid
        .iter()
        .flat_map(|&lat| lon_mid.iter().map(move |&lon| (lon, lat)))
        .collect()
}

/// Mean of each cell's four vertex values (trapezoid average).
pub fn cell_average(field: &GridField) -> GridField {
    let w = field.width.saturating_sub(1);
    let h = field.height.saturating_sub(1);
    let mut out = GridField::zeros(w, h);
    for r in 0..h {
        for c in 0..w {
            let v = (field.get(r, c) + field.get(r, c + 1) + field.get(r + 1, c) + field.get(r + 1, c + 1)) / 4.0;
            out.set(r, c, v);
        }
    }
    out
}

/// Index `j` with `axis[j] < v ≤ axis[j + 1]`.
fn cell_index(axis: &[f64], v: f64) -> Option<usize> {
    let k = axis.partition_point(|&x| x < v);
    (k >= 1 && k < axis.len()).then(|| k - 1)
}

/// Number of `(lon, lat)` points per cell. Cells are half-open
/// `(low, high]` on both axes; points outside every cell are ignored.
pub fn cell_poi_counts(grid: &Grid, points: &[(f64, f64)]) -> GridField {
    let mut out = GridField::zeros(grid.cols().saturating_sub(1), grid.rows().saturating_sub(1));
    for &(lon, lat) in points {
        if let (Some(c), Some(r)) = (cell_index(&grid.lon_axis, lon), cell_index(&grid.lat_axis, lat)) {
            out.set(r, c, out.get(r, c) + 1.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::BoundingBox;
    use crate::grid::{build_grid, GridStep};

    fn unit_grid() -> Grid {
        // Nodes at 0, 1, 2 on both axes → 2×2 cells.
        let bbox = BoundingBox::new(0.0, 0.0, 2.5, 2.5).unwrap();
        build_grid(&bbox, GridStep::Degrees(1.0)).unwrap()
    }

    #[test]
    fn midpoints_sit_between_nodes() {
        let g = unit_grid();
        assert_eq!(midpoint_coords(&g), vec![(0.5, 0.5), (1.5, 0.5), (0.5, 1.5), (1.5, 1.5)]);
    }

    #[test]
    fn cell_average_of_a_ramp() {
        let f = GridField::from_vec(3, 2, vec![0.0, 1.0, 2.0, 2.0, 3.0, 4.0]).unwrap();
        let avg = cell_average(&f);
        assert_eq!(avg.shape(), (1, 2));
        assert_eq!(avg.data, vec![1.5, 2.5]);
    }

    #[test]
    fn counts_use_half_open_cells() {
        let g = unit_grid();
        let pts = [
            (0.5, 0.5),
            (1.0, 1.0), // on the upper edge of cell (0, 0)
            (1.5, 0.2),
            (0.0, 0.5), // on the lower lon edge: outside
            (2.0, 2.0),
            (2.1, 1.0), // beyond the last node
        ];
        let counts = cell_poi_counts(&g, &pts);
        assert_eq!(counts.shape(), (2, 2));
        assert_eq!(counts.data, vec![2.0, 1.0, 0.0, 1.0]);
    }
}
