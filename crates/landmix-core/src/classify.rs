//! Tag-based category classifier.
//!
//! The classifier is an ordered rule list. Each rule matches one tag key and
//! a set of values; when several of a feature's tags match, the last rule in
//! the list wins. Value lists follow the OpenStreetMap wiki, restricted to
//! tags that denote an activity or a dwelling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ClassificationMode;
use crate::error::{LumError, Result};
use crate::feature::{Category, ClassifiedPoi, Feature, FeatureId};

// ── Value lists ───────────────────────────────────────────────────────────────

const AMENITY_ACTIVITIES: &[&str] = &[
    // sustenance
    "bar", "pub", "restaurant", "biergarten", "cafe", "fast_food", "food_court", "ice_cream",
    // education
    "college", "kindergarten", "library", "public_bookcase", "school", "music_school",
    "driving_school", "language_school", "university",
    // transportation
    "fuel", "bicycle_rental", "bus_station", "car_rental", "taxi", "car_wash", "ferry_terminal",
    // financial
    "atm", "bank", "bureau_de_change",
    // healthcare
    "baby_hatch", "clinic", "dentist", "doctors", "hospital", "nursing_home", "pharmacy",
    "social_facility", "veterinary",
    // entertainment
    "arts_centre", "brothel", "casino", "cinema", "community_centre", "fountain", "gambling",
    "nightclub", "planetarium", "social_centre", "stripclub", "studio", "swingerclub", "theatre",
    // others
    "animal_boarding", "animal_shelter", "courthouse", "coworking_space", "crematorium",
    "dive_centre", "dojo", "embassy", "fire_station", "gym", "internet_cafe", "marketplace",
    "police", "post_office", "townhall",
];

const LEISURE_ACTIVITIES: &[&str] = &[
    "adult_gaming_centre", "amusement_arcade", "beach_resort", "dance", "hackerspace", "ice_rink",
    "pitch", "sports_centre", "stadium", "summer_camp", "swimming_area", "water_park",
];

const BUILDING_COMMERCIAL: &[&str] = &[
    "commercial", "office", "industrial", "warehouse",
    // auxiliary buildings that host an activity
    "garage", "garages", "hangar", "stable", "cowshed", "digester",
];

const BUILDING_RETAIL: &[&str] = &["retail", "kiosk"];

const BUILDING_CIVIC: &[&str] = &[
    "cathedral", "chapel", "church", "mosque", "temple", "synagogue", "shrine", "civic",
    "hospital", "school", "stadium", "train_station", "transportation", "university", "public",
];

const BUILDING_RESIDENTIAL: &[&str] = &[
    "hotel", "farm", "apartment", "apartments", "dormitory", "house", "residential",
    "retirement_home", "terrace", "houseboat", "bungalow", "static_caravan", "detached",
];

/// Land uses that denote an activity when they tag a region.
pub const LANDUSE_ACTIVITIES: &[&str] = &[
    "commercial", "industrial", "retail", "port", "quarry", "salt_pond", "construction",
    "military", "garages",
];

const LANDUSE_COMMERCIAL: &[&str] = &[
    "commercial", "industrial", "port", "quarry", "salt_pond", "construction", "military",
    "garages",
];

pub const LANDUSE_RESIDENTIAL: &[&str] = &["residential"];

/// Land uses that are neither residential nor an activity.
pub const LANDUSE_OTHER: &[&str] = &[
    "cemetery", "landfill", "railway",
    // water
    "water", "reservoir", "basin",
    // green
    "allotments", "conservation", "farmland", "farmyard", "forest", "grass", "greenfield",
    "greenhouse_horticulture", "meadow", "orchard", "pasture", "peat_cutting", "plant_nursery",
    "recreation_ground", "village_green", "vineyard",
];

/// Key under which inferred polygon uses are recorded.
pub const INFERRED_KEY: &str = "inferred";

// ── Rule table ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum ValueMatch {
    /// Any non-empty value.
    Any,
    OneOf(&'static [&'static str]),
}

impl ValueMatch {
    fn matches(self, value: &str) -> bool {
        match self {
            ValueMatch::Any => !value.is_empty(),
            ValueMatch::OneOf(values) => values.contains(&value),
        }
    }
}

/// `(key, values) → category`.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub key: &'static str,
    pub values: ValueMatch,
    pub category: Category,
}

const fn rule(key: &'static str, values: ValueMatch, category: Category) -> Rule {
    Rule { key, values, category }
}

/// Fine-grained rules in priority order; later entries override earlier ones.
pub const RULES: &[Rule] = &[
    rule("landuse", ValueMatch::OneOf(LANDUSE_COMMERCIAL), Category::CommercialIndustrial),
    rule("landuse", ValueMatch::OneOf(&["retail"]), Category::Shop),
    rule("landuse", ValueMatch::OneOf(LANDUSE_RESIDENTIAL), Category::Residential),
    rule(INFERRED_KEY, ValueMatch::OneOf(LANDUSE_COMMERCIAL), Category::CommercialIndustrial),
    rule(INFERRED_KEY, ValueMatch::OneOf(&["retail"]), Category::Shop),
    rule(INFERRED_KEY, ValueMatch::OneOf(LANDUSE_RESIDENTIAL), Category::Residential),
    rule("building", ValueMatch::OneOf(BUILDING_COMMERCIAL), Category::CommercialIndustrial),
    rule("building", ValueMatch::OneOf(BUILDING_CIVIC), Category::LeisureAmenity),
    rule("building", ValueMatch::OneOf(BUILDING_RETAIL), Category::Shop),
    rule("building", ValueMatch::OneOf(BUILDING_RESIDENTIAL), Category::Residential),
    rule("leisure", ValueMatch::OneOf(LEISURE_ACTIVITIES), Category::LeisureAmenity),
    rule("amenity", ValueMatch::OneOf(AMENITY_ACTIVITIES), Category::LeisureAmenity),
    rule("shop", ValueMatch::Any, Category::Shop),
    rule("residential", ValueMatch::Any, Category::Residential),
];

fn coarsen(category: Category, mode: ClassificationMode) -> Category {
    match (mode, category) {
        (ClassificationMode::Fine, c) => c,
        (ClassificationMode::Coarse, Category::Residential) => Category::Residential,
        (ClassificationMode::Coarse, _) => Category::Activity,
    }
}

fn fine_category(key: &str, value: &str) -> Option<Category> {
    RULES
        .iter()
        .rev()
        .find(|r| r.key == key && r.values.matches(value))
        .map(|r| r.category)
}

// ── Single tag ────────────────────────────────────────────────────────────────

/// Category of one `(key, value)` tag.
///
/// In fine mode an unmatched pair has no category. In coarse mode every
/// pair that is not residential is an activity.
pub fn classify(key: &str, value: &str, mode: ClassificationMode) -> Option<Category> {
    match (fine_category(key, value), mode) {
        (Some(c), _) => Some(coarsen(c, mode)),
        (None, ClassificationMode::Coarse) => Some(Category::Activity),
        (None, ClassificationMode::Fine) => None,
    }
}

/// Like [`classify`], but reports an unmatched pair as an error.
pub fn try_classify(key: &str, value: &str, mode: ClassificationMode) -> Result<Category> {
    classify(key, value, mode).ok_or_else(|| LumError::Unclassifiable {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Winning `(category, key, value)` among a feature's tags, or `None` if no
/// tag matches any rule.
pub fn classify_tags<'a>(feature: &'a Feature, mode: ClassificationMode) -> Option<(Category, &'a str, &'a str)> {
    let mut winner: Option<(usize, &'a str, &'a str)> = None;
    for (key, value) in &feature.tags {
        let value = value.trim();
        if let Some(idx) = RULES.iter().rposition(|r| r.key == key.as_str() && r.values.matches(value)) {
            if winner.map_or(true, |(w, _, _)| idx > w) {
                winner = Some((idx, key.as_str(), value));
            }
        }
    }
    winner.map(|(idx, key, value)| (coarsen(RULES[idx].category, mode), key, value))
}

/// A polygon tagged with a land use but no building is a region, not a POI.
pub fn is_land_use_region(feature: &Feature) -> bool {
    feature.is_polygon() && feature.tag("landuse").is_some() && feature.tag("building").is_none()
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// Output of [`classify_features`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub pois: Vec<ClassifiedPoi>,
    /// Features with no matching tag, or no usable geometry.
    pub unclassified: Vec<FeatureId>,
    /// Land-use region polygons, which are never POIs.
    pub land_use_regions: usize,
}

/// Classify every feature. Polygons become POIs at their centroid.
pub fn classify_features(features: &[Feature], mode: ClassificationMode) -> Classification {
    let mut out = Classification::default();
    for feature in features {
        if is_land_use_region(feature) {
            out.land_use_regions += 1;
            continue;
        }
        let Some((category, key, value)) = classify_tags(feature, mode) else {
            out.unclassified.push(feature.id);
            continue;
        };
        let Some((lon, lat)) = feature.representative_point() else {
            log::debug!("feature {} has no usable geometry", feature.id);
            out.unclassified.push(feature.id);
            continue;
        };
        out.pois.push(ClassifiedPoi {
            id: feature.id,
            lon,
            lat,
            category,
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    log::info!(
        "classified {} POIs, {} unclassified, {} land-use regions",
        out.pois.len(),
        out.unclassified.len(),
        out.land_use_regions
    );
    out
}

/// Number of POIs per category.
pub fn category_counts(pois: &[ClassifiedPoi]) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for poi in pois {
        *counts.entry(poi.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClassificationMode::{Coarse, Fine};

    #[test]
    fn fine_categories_by_key() {
        assert_eq!(classify("shop", "bakery", Fine), Some(Category::Shop));
        assert_eq!(classify("shop", "anything_goes", Fine), Some(Category::Shop));
        assert_eq!(classify("amenity", "cafe", Fine), Some(Category::LeisureAmenity));
        assert_eq!(classify("leisure", "pitch", Fine), Some(Category::LeisureAmenity));
        assert_eq!(classify("building", "office", Fine), Some(Category::CommercialIndustrial));
        assert_eq!(classify("building", "garage", Fine), Some(Category::CommercialIndustrial));
        assert_eq!(classify("building", "kiosk", Fine), Some(Category::Shop));
        assert_eq!(classify("building", "church", Fine), Some(Category::LeisureAmenity));
        assert_eq!(classify("building", "apartments", Fine), Some(Category::Residential));
        assert_eq!(classify("landuse", "industrial", Fine), Some(Category::CommercialIndustrial));
        assert_eq!(classify("inferred", "retail", Fine), Some(Category::Shop));
        assert_eq!(classify("inferred", "residential", Fine), Some(Category::Residential));
        assert_eq!(classify("residential", "yes", Fine), Some(Category::Residential));
    }

    #[test]
    fn non_matching_rows_stay_unclassified() {
        assert_eq!(classify("amenity", "bench", Fine), None);
        assert_eq!(classify("building", "yes", Fine), None);
        assert_eq!(classify("shop", "", Fine), None);
        assert_eq!(classify("highway", "primary", Fine), None);
        assert!(matches!(
            try_classify("highway", "primary", Fine),
            Err(LumError::Unclassifiable { .. })
        ));
    }

    #[test]
    fn coarse_mode_has_two_buckets() {
        assert_eq!(classify("residential", "yes", Coarse), Some(Category::Residential));
        assert_eq!(classify("building", "house", Coarse), Some(Category::Residential));
        assert_eq!(classify("shop", "bakery", Coarse), Some(Category::Activity));
        assert_eq!(classify("highway", "primary", Coarse), Some(Category::Activity));
    }

    #[test]
    fn later_rule_overrides_earlier_one() {
        // building=house alone is residential; a shop tag on top wins.
        let f = Feature::point(1, 0.0, 0.0).with_tag("building", "house").with_tag("shop", "bakery");
        let (cat, key, value) = classify_tags(&f, Fine).unwrap();
        assert_eq!((cat, key, value), (Category::Shop, "shop", "bakery"));

        // amenity outranks building regardless of tag iteration order.
        let g = Feature::point(2, 0.0, 0.0).with_tag("amenity", "school").with_tag("building", "apartments");
        assert_eq!(classify_tags(&g, Fine).map(|t| t.0), Some(Category::LeisureAmenity));
    }

    #[test]
    fn classification_is_deterministic() {
        let features: Vec<Feature> = (0..20)
            .map(|i| {
                let f = Feature::point(i, 2.3 + i as f64 * 1e-3, 48.8);
                match i % 4 {
                    0 => f.with_tag("shop", "books"),
                    1 => f.with_tag("building", "house"),
                    2 => f.with_tag("amenity", "bench"),
                    _ => f.with_tag("leisure", "pitch").with_tag("building", "retail"),
                }
            })
            .collect();
        let a = classify_features(&features, Fine);
        let b = classify_features(&features, Fine);
        assert_eq!(a, b);
        assert_eq!(a.pois.len(), 15);
        assert_eq!(a.unclassified, vec![2, 6, 10, 14, 18]);
    }

    #[test]
    fn land_use_regions_are_not_pois() {
        let ring = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let region = Feature::polygon(1, ring.clone()).with_tag("landuse", "residential");
        let building = Feature::polygon(2, ring).with_tag("landuse", "residential").with_tag("building", "yes");
        let out = classify_features(&[region, building], Fine);
        assert_eq!(out.land_use_regions, 1);
        assert_eq!(out.pois.len(), 1);
        assert_eq!(out.pois[0].id, 2);
        assert_eq!(out.pois[0].category, Category::Residential);
        assert!((out.pois[0].lon - 0.5).abs() < 1e-12 && (out.pois[0].lat - 0.5).abs() < 1e-12);
    }

    #[test]
    fn counts_per_category() {
        let features = vec![
            Feature::point(1, 0.0, 0.0).with_tag("shop", "books"),
            Feature::point(2, 0.0, 0.0).with_tag("shop", "toys"),
            Feature::point(3, 0.0, 0.0).with_tag("building", "house"),
        ];
        let counts = category_counts(&classify_features(&features, Fine).pois);
        assert_eq!(counts[&Category::Shop], 2);
        assert_eq!(counts[&Category::Residential], 1);
        assert!(!counts.contains_key(&Category::LeisureAmenity));
    }
}
