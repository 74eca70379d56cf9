//! Feature store contract and a JSON-backed in-memory implementation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coords::BoundingBox;
use crate::error::Result;
use crate::feature::Feature;

/// Source of raw tagged features.
pub trait FeatureStore {
    /// Every feature whose extent overlaps `region`.
    fn read(&self, region: &BoundingBox) -> Result<Vec<Feature>>;
}

/// Serialized form: `{ "features": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Bounding box of every vertex, or `None` when there are none.
    pub fn extent(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.features.iter().flat_map(|f| f.vertices()))
    }
}

/// Features held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeatureStore {
    features: Vec<Feature>,
}

impl MemoryFeatureStore {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl From<FeatureCollection> for MemoryFeatureStore {
    fn from(c: FeatureCollection) -> Self {
        Self::new(c.features)
    }
}

fn overlaps(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.lon_min <= b.lon_max && b.lon_min <= a.lon_max && a.lat_min <= b.lat_max && b.lat_min <= a.lat_max
}

impl FeatureStore for MemoryFeatureStore {
    fn read(&self, region: &BoundingBox) -> Result<Vec<Feature>> {
        Ok(self
            .features
            .iter()
            .filter(|f| BoundingBox::from_points(f.vertices()).is_some_and(|ext| overlaps(&ext, region)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryFeatureStore {
        MemoryFeatureStore::new(vec![
            Feature::point(1, 2.35, 48.85).with_tag("shop", "books"),
            Feature::point(2, 5.0, 45.0).with_tag("shop", "books"),
            // Straddles the region's eastern edge.
            Feature::polygon(3, vec![[2.36, 48.85], [2.40, 48.85], [2.40, 48.86], [2.36, 48.86]]),
        ])
    }

    #[test]
    fn read_filters_by_region() {
        let region = BoundingBox::new(48.84, 2.33, 48.87, 2.37).unwrap();
        let ids: Vec<_> = store().read(&region).unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn collection_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        let collection = FeatureCollection { features: store().features };
        fs::write(&path, serde_json::to_string(&collection).unwrap()).unwrap();

        let loaded = FeatureCollection::from_json_file(&path).unwrap();
        assert_eq!(loaded, collection);
        let ext = loaded.extent().unwrap();
        assert_eq!((ext.lon_min, ext.lon_max), (2.35, 5.0));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(FeatureCollection::from_json_file(&path).is_err());
        assert!(FeatureCollection::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
