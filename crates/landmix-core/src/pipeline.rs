//! POI extraction: classify tagged features, infer the use of untagged
//! building polygons tile by tile, and merge both into one POI set.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::classify::{category_counts, classify_features, is_land_use_region};
use crate::config::PipelineConfig;
use crate::coords::BoundingBox;
use crate::feature::{Category, ClassifiedPoi, Feature, FeatureId};
use crate::infer::{candidate_regions, infer_polygon_uses, inferred_pois, polygons_to_infer, InferenceResult};
use crate::tiling::split_into_tiles;

/// Output of [`extract_pois`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Tag-classified POIs followed by inferred ones.
    pub pois: Vec<ClassifiedPoi>,
    /// Features that produced no POI, inferred polygons excluded.
    pub unclassified: Vec<FeatureId>,
    pub land_use_regions: usize,
    pub inference: InferenceResult,
    pub counts: BTreeMap<Category, usize>,
}

/// Cache key for the POIs of `city` extracted under `config`. Runs whose
/// extraction settings differ never share an entry.
pub fn extraction_cache_key(city: &str, config: &PipelineConfig) -> CacheKey {
    CacheKey::new(city, &format!("pois-{}", config.extraction_checksum()))
}

/// Run classification and polygon-use inference over `features`.
///
/// Each tile infers against its own regions plus the shared (border
/// spanning) ones. Shared building polygons are inferred in a final pass
/// against every region.
pub fn extract_pois(features: &[Feature], config: &PipelineConfig) -> Extraction {
    let mode = config.classification_mode;
    let classification = classify_features(features, mode);
    let mut extraction = Extraction {
        pois: classification.pois,
        unclassified: classification.unclassified,
        land_use_regions: classification.land_use_regions,
        ..Extraction::default()
    };

    let Some(bbox) = BoundingBox::from_points(features.iter().flat_map(|f| f.vertices())) else {
        return extraction;
    };
    let opts = &config.inference;
    let tiling = split_into_tiles(features, &bbox, config.tiles_per_side);
    let shared_regions: Vec<&Feature> = tiling.shared.iter().copied().filter(|f| is_land_use_region(f)).collect();

    let mut inferred: Vec<&Feature> = Vec::new();
    for (i, tile) in tiling.tiles.iter().enumerate() {
        let polygons = polygons_to_infer(tile.iter().copied(), opts);
        if polygons.is_empty() {
            continue;
        }
        let candidates = candidate_regions(tile.iter().copied().chain(shared_regions.iter().copied()));
        log::debug!("tile {i}: {} polygons against {} regions", polygons.len(), candidates.len());
        extraction.inference.merge(infer_polygon_uses(&polygons, &candidates, opts));
        inferred.extend(polygons);
    }

    let shared_polygons = polygons_to_infer(tiling.shared.iter().copied(), opts);
    if !shared_polygons.is_empty() {
        let candidates = candidate_regions(features);
        log::debug!("shared pass: {} polygons against {} regions", shared_polygons.len(), candidates.len());
        extraction.inference.merge(infer_polygon_uses(&shared_polygons, &candidates, opts));
        inferred.extend(shared_polygons);
    }

    let new_pois = inferred_pois(&inferred, &extraction.inference, mode);
    let labelled: HashSet<FeatureId> = new_pois.iter().map(|p| p.id).collect();
    extraction.unclassified.retain(|id| !labelled.contains(id));
    extraction.pois.extend(new_pois);
    extraction.counts = category_counts(&extraction.pois);

    log::info!(
        "extracted {} POIs ({} inferred) from {} features over {} tile(s)",
        extraction.pois.len(),
        labelled.len(),
        features.len(),
        tiling.tiles.len()
    );
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{load_or_compute, MemoryCache};
    use crate::config::ClassificationMode;
    use std::cell::Cell;

    fn square(id: FeatureId, cx: f64, cy: f64, half: f64) -> Feature {
        Feature::polygon(
            id,
            vec![[cx - half, cy - half], [cx + half, cy - half], [cx + half, cy + half], [cx - half, cy + half]],
        )
    }

    fn town() -> Vec<Feature> {
        vec![
            Feature::point(1, 0.10, 0.10).with_tag("shop", "bakery"),
            Feature::point(2, 0.90, 0.90).with_tag("amenity", "school"),
            Feature::point(3, 0.50, 0.50).with_tag("highway", "bus_stop"),
            square(4, 0.25, 0.25, 0.20).with_tag("landuse", "residential"),
            square(5, 0.75, 0.75, 0.20).with_tag("landuse", "industrial"),
            square(10, 0.25, 0.25, 0.01).with_tag("building", "yes"),
            square(11, 0.75, 0.75, 0.01).with_tag("building", "yes"),
            // Outside every region: promoted to residential by default.
            square(12, 0.75, 0.20, 0.01).with_tag("building", "yes"),
            square(13, 0.20, 0.80, 0.01).with_tag("building", "house"),
        ]
    }

    #[test]
    fn tagged_and_inferred_pois_are_merged() {
        let out = extract_pois(&town(), &PipelineConfig::default());
        let ids: Vec<_> = out.pois.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 13, 11, 10, 12]);
        assert_eq!(out.unclassified, vec![3]);
        assert_eq!(out.land_use_regions, 2);
        assert_eq!(out.inference.promoted, 1);
        assert_eq!(out.counts[&Category::Residential], 3);
        assert_eq!(out.counts[&Category::CommercialIndustrial], 1);
        let industrial = out.pois.iter().find(|p| p.id == 11).unwrap();
        assert_eq!((industrial.key.as_str(), industrial.value.as_str()), ("inferred", "industrial"));
    }

    #[test]
    fn tiling_does_not_change_the_result_for_contained_buildings() {
        let single = extract_pois(&town(), &PipelineConfig::default());
        let tiled = extract_pois(&town(), &PipelineConfig { tiles_per_side: 2, ..PipelineConfig::default() });
        let sorted = |e: &Extraction| {
            let mut v: Vec<_> = e.pois.iter().map(|p| (p.id, p.category)).collect();
            v.sort();
            v
        };
        assert_eq!(sorted(&single), sorted(&tiled));
    }

    #[test]
    fn buildings_on_tile_borders_use_the_shared_pass() {
        let features = vec![
            square(1, 0.5, 0.5, 0.3).with_tag("landuse", "retail"),
            square(2, 0.5, 0.5, 0.02).with_tag("building", "yes"),
            Feature::point(3, 0.0, 0.0).with_tag("shop", "books"),
            Feature::point(4, 1.0, 1.0).with_tag("shop", "books"),
        ];
        let out = extract_pois(&features, &PipelineConfig { tiles_per_side: 2, ..PipelineConfig::default() });
        let inferred = out.pois.iter().find(|p| p.id == 2).unwrap();
        assert_eq!((inferred.category, inferred.value.as_str()), (Category::Shop, "retail"));
    }

    #[test]
    fn coarse_mode_collapses_categories() {
        let config = PipelineConfig { classification_mode: ClassificationMode::Coarse, ..PipelineConfig::default() };
        let out = extract_pois(&town(), &config);
        assert_eq!(out.counts.keys().copied().collect::<Vec<_>>(), vec![Category::Residential, Category::Activity]);
        assert_eq!(out.counts[&Category::Activity], 3);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = extract_pois(&[], &PipelineConfig::default());
        assert!(out.pois.is_empty() && out.counts.is_empty());
    }

    #[test]
    fn changed_extraction_settings_miss_the_cache() {
        let features = town();
        let fine = PipelineConfig::default();
        let coarse = PipelineConfig { classification_mode: ClassificationMode::Coarse, ..PipelineConfig::default() };
        let mut cache = MemoryCache::new();
        let runs = Cell::new(0);
        let mut run = |config: &PipelineConfig| {
            load_or_compute(&mut cache, &extraction_cache_key("town", config), || {
                runs.set(runs.get() + 1);
                Ok(extract_pois(&features, config))
            })
            .unwrap()
        };

        let first = run(&fine);
        assert_eq!(run(&fine).counts, first.counts);
        assert_eq!(runs.get(), 1);

        let second = run(&coarse);
        assert_eq!(runs.get(), 2);
        assert!(second.counts.contains_key(&Category::Activity));
        assert!(!first.counts.contains_key(&Category::Activity));
    }
}
