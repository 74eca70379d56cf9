//! Population downscaling: spread each raster cell's count evenly over the
//! residential points that fall strictly inside the cell's footprint.
//!
//! Points are bucketed by their fractional pixel position (inverse
//! geotransform), so the cost is linear in points plus region cells rather
//! than their product.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coords::BoundingBox;
use crate::feature::ClassifiedPoi;
use crate::raster::{GeoTransform, RasterStore};

/// Inclusive pixel window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl PixelWindow {
    pub fn cell_count(&self) -> usize {
        (self.row_max - self.row_min + 1) * (self.col_max - self.col_min + 1)
    }
}

/// Pixels covering `bbox`: the corners' pixel positions rounded outward
/// (floor of the minimum, ceil of the maximum), clamped to the raster.
/// `None` when the box misses the raster or the transform is singular.
pub fn region_of_interest(gt: &GeoTransform, shape: (usize, usize), bbox: &BoundingBox) -> Option<PixelWindow> {
    let (rows, cols) = shape;
    if rows == 0 || cols == 0 {
        return None;
    }
    let corners = [
        (bbox.lon_min, bbox.lat_min),
        (bbox.lon_min, bbox.lat_max),
        (bbox.lon_max, bbox.lat_min),
        (bbox.lon_max, bbox.lat_max),
    ];
    let mut px = Vec::with_capacity(4);
    for (lon, lat) in corners {
        px.push(gt.coord_to_pixel(lon, lat)?);
    }
    let c_min = px.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).floor();
    let c_max = px.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max).ceil();
    let r_min = px.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor();
    let r_max = px.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil();
    if c_max < 0.0 || r_max < 0.0 || c_min > (cols - 1) as f64 || r_min > (rows - 1) as f64 {
        return None;
    }
    let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
    Some(PixelWindow {
        row_min: clamp(r_min, rows - 1),
        row_max: clamp(r_max, rows - 1),
        col_min: clamp(c_min, cols - 1),
        col_max: clamp(c_max, cols - 1),
    })
}

/// Pixel `(row, col)` whose interior holds `(lon, lat)`. Points on a pixel
/// edge belong to no pixel.
fn containing_pixel(gt: &GeoTransform, lon: f64, lat: f64) -> Option<(usize, usize)> {
    let (c, r) = gt.coord_to_pixel(lon, lat)?;
    if c < 0.0 || r < 0.0 || c.fract() == 0.0 || r.fract() == 0.0 {
        return None;
    }
    Some((r.floor() as usize, c.floor() as usize))
}

/// A residential point with its estimated population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationPoint {
    #[serde(flatten)]
    pub poi: ClassifiedPoi,
    pub population: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownscaleReport {
    pub region: Option<PixelWindow>,
    /// Region cells holding at least one point.
    pub cells_with_points: usize,
    /// Region cells holding no point; their count is not distributed.
    pub empty_cells: usize,
    /// Points outside every valid cell, left at 0.
    pub unplaced_points: usize,
    pub population_assigned: f64,
}

/// Assign every raster cell's count evenly to the points strictly inside it.
pub fn downscale_population<R: RasterStore + ?Sized>(
    raster: &R,
    residential: &[ClassifiedPoi],
) -> (Vec<PopulationPoint>, DownscaleReport) {
    let gt = raster.geotransform();
    let mut points: Vec<PopulationPoint> = residential
        .iter()
        .map(|poi| PopulationPoint { poi: poi.clone(), population: 0.0 })
        .collect();
    let mut report = DownscaleReport::default();

    let Some(bbox) = BoundingBox::from_points(residential.iter().map(|p| (p.lon, p.lat))) else {
        return (points, report);
    };
    report.region = region_of_interest(&gt, raster.shape(), &bbox);
    let Some(window) = report.region else {
        log::warn!("residential points do not overlap the population raster");
        report.unplaced_points = points.len();
        return (points, report);
    };

    let mut buckets: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for (i, p) in residential.iter().enumerate() {
        match containing_pixel(&gt, p.lon, p.lat) {
            Some(cell) if raster.read_cell(cell.0, cell.1).is_some() => buckets.entry(cell).or_default().push(i),
            _ => report.unplaced_points += 1,
        }
    }

    for (&(row, col), members) in &buckets {
        // Guarded above: every bucket is a readable cell with ≥ 1 point.
        let Some(count) = raster.read_cell(row, col) else { continue };
        let share = count / members.len() as f64;
        for &i in members {
            points[i].population = share;
        }
        report.population_assigned += count;
    }
    report.cells_with_points = buckets.len();
    report.empty_cells = window.cell_count().saturating_sub(buckets.len());

    log::info!(
        "downscaled {:.1} people onto {} points over {} cells ({} empty, {} points unplaced)",
        report.population_assigned,
        points.len(),
        report.cells_with_points,
        report.empty_cells,
        report.unplaced_points
    );
    (points, report)
}
