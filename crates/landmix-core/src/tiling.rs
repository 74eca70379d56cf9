//! Split a feature set into an `n × n` grid of tiles.
//!
//! Points go to the tile they fall in. A polygon goes to a tile only if all
//! its vertices do; otherwise it lands in the shared set, which holds the
//! polygons that span tile borders.

use crate::coords::BoundingBox;
use crate::feature::Feature;

#[derive(Debug, Clone, Default)]
pub struct Tiling<'a> {
    /// Row-major tiles, `tiles_per_side²` of them.
    pub tiles: Vec<Vec<&'a Feature>>,
    pub shared: Vec<&'a Feature>,
    pub tiles_per_side: usize,
}

/// Tile `(row, col)` of a coordinate. Coordinates outside `bbox` clamp to the
/// nearest edge tile.
fn tile_of(bbox: &BoundingBox, n: usize, lon: f64, lat: f64) -> (usize, usize) {
    let index = |v: f64, min: f64, extent: f64| -> usize {
        if extent <= 0.0 {
            return 0;
        }
        let t = ((v - min) / extent * n as f64).floor();
        t.max(0.0).min((n - 1) as f64) as usize
    };
    (
        index(lat, bbox.lat_min, bbox.lat_extent()),
        index(lon, bbox.lon_min, bbox.lon_extent()),
    )
}

/// Partition `features` into `n × n` tiles over `bbox` (`n` of 0 acts as 1).
pub fn split_into_tiles<'a>(features: &'a [Feature], bbox: &BoundingBox, n: usize) -> Tiling<'a> {
    let n = n.max(1);
    let mut tiling = Tiling { tiles: vec![Vec::new(); n * n], shared: Vec::new(), tiles_per_side: n };

    for feature in features {
        let mut cells = feature.vertices().into_iter().map(|(lon, lat)| tile_of(bbox, n, lon, lat));
        let Some(first) = cells.next() else { continue };
        if cells.all(|c| c == first) {
            tiling.tiles[first.0 * n + first.1].push(feature);
        } else {
            tiling.shared.push(feature);
        }
    }

    log::debug!(
        "split {} features into {} tiles, {} shared",
        features.len(),
        n * n,
        tiling.shared.len()
    );
    tiling
}
