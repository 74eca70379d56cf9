//! Raster access contract and the affine pixel ↔ coordinate transform.

use serde::{Deserialize, Serialize};

/// Affine geotransform in the usual six-coefficient layout:
///
///   x = t[0] + col·t[1] + row·t[2]
///   y = t[3] + col·t[4] + row·t[5]
///
/// with `(x, y) = (lon, lat)` and `(col, row)` fractional pixel coordinates
/// of the pixel's upper-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform from an origin and pixel size. `pixel_lat` is
    /// usually negative.
    pub fn north_up(origin_lon: f64, origin_lat: f64, pixel_lon: f64, pixel_lat: f64) -> Self {
        Self([origin_lon, pixel_lon, 0.0, origin_lat, 0.0, pixel_lat])
    }

    /// `(lon, lat)` of fractional pixel position `(col, row)`.
    pub fn pixel_to_coord(&self, col: f64, row: f64) -> (f64, f64) {
        let t = &self.0;
        (t[0] + col * t[1] + row * t[2], t[3] + col * t[4] + row * t[5])
    }

    /// Fractional `(col, row)` of `(lon, lat)`. `None` for a singular transform.
    pub fn coord_to_pixel(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let t = &self.0;
        let det = t[1] * t[5] - t[2] * t[4];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let (dx, dy) = (lon - t[0], lat - t[3]);
        Some(((t[5] * dx - t[2] * dy) / det, (t[1] * dy - t[4] * dx) / det))
    }
}

/// Read access to a single-band raster.
pub trait RasterStore {
    /// `(rows, cols)`.
    fn shape(&self) -> (usize, usize);
    /// Cell value, or `None` outside the raster or on a no-data cell.
    fn read_cell(&self, row: usize, col: usize) -> Option<f64>;
    fn geotransform(&self) -> GeoTransform;
}

/// A raster held in memory, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRaster {
    pub geotransform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
    #[serde(default)]
    pub nodata: Option<f64>,
}

impl RasterStore for MemoryRaster {
    fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    fn read_cell(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let v = *self.data.get(row * self.width + col)?;
        match self.nodata {
            Some(nd) if v == nd => None,
            _ if !v.is_finite() => None,
            _ => Some(v),
        }
    }

    fn geotransform(&self) -> GeoTransform {
        self.geotransform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn north_up_round_trip() {
        let gt = GeoTransform::north_up(2.0, 49.0, 0.01, -0.01);
        let (lon, lat) = gt.pixel_to_coord(3.5, 7.25);
        assert_abs_diff_eq!(lon, 2.035, epsilon = 1e-12);
        assert_abs_diff_eq!(lat, 48.9275, epsilon = 1e-12);
        let (c, r) = gt.coord_to_pixel(lon, lat).unwrap();
        assert_abs_diff_eq!(c, 3.5, epsilon = 1e-9);
        assert_abs_diff_eq!(r, 7.25, epsilon = 1e-9);
    }

    #[test]
    fn rotated_transform_inverts() {
        let gt = GeoTransform([10.0, 0.5, 0.1, 20.0, -0.05, -0.4]);
        for &(c, r) in &[(0.0, 0.0), (4.0, 9.0), (-2.5, 3.3)] {
            let (x, y) = gt.pixel_to_coord(c, r);
            let (c2, r2) = gt.coord_to_pixel(x, y).unwrap();
            assert_abs_diff_eq!(c, c2, epsilon = 1e-9);
            assert_abs_diff_eq!(r, r2, epsilon = 1e-9);
        }
        assert!(GeoTransform([0.0, 1.0, 2.0, 0.0, 1.0, 2.0]).coord_to_pixel(1.0, 1.0).is_none());
    }

    #[test]
    fn memory_raster_reads_cells_and_nodata() {
        let raster = MemoryRaster {
            geotransform: GeoTransform::north_up(0.0, 1.0, 0.5, -0.5),
            width: 2,
            height: 2,
            data: vec![1.0, -9999.0, 3.0, 4.0],
            nodata: Some(-9999.0),
        };
        assert_eq!(raster.shape(), (2, 2));
        assert_eq!(raster.read_cell(1, 0), Some(3.0));
        assert_eq!(raster.read_cell(0, 1), None);
        assert_eq!(raster.read_cell(2, 0), None);
        let gt = raster.geotransform();
        assert_eq!(gt.pixel_to_coord(1.0, 1.0), (0.5, 0.5));
        assert_eq!(gt.pixel_to_coord(2.0, 2.0), (1.0, 0.0));
    }
}
