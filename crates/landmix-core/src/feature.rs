//! Raw tagged features and the categorized POIs derived from them.

use std::collections::BTreeMap;
use std::fmt;

use geo::{Centroid, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::coords::sinusoidal_area_m2;

/// Stable feature identifier (e.g. an OSM id).
pub type FeatureId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Point { lon: f64, lat: f64 },
    /// Outer ring of `[lon, lat]` vertices; closing vertex optional.
    Polygon { ring: Vec<[f64; 2]> },
}

/// A point or polygon with string tags. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Feature {
    pub fn point(id: FeatureId, lon: f64, lat: f64) -> Self {
        Self { id, geometry: Geometry::Point { lon, lat }, tags: BTreeMap::new() }
    }

    pub fn polygon(id: FeatureId, ring: Vec<[f64; 2]>) -> Self {
        Self { id, geometry: Geometry::Polygon { ring }, tags: BTreeMap::new() }
    }

    /// Builder-style tag insertion.
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Value of `key`, treating an empty string as absent.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn is_polygon(&self) -> bool {
        matches!(self.geometry, Geometry::Polygon { .. })
    }

    /// `geo` polygon for polygon features.
    pub fn to_geo_polygon(&self) -> Option<Polygon<f64>> {
        match &self.geometry {
            Geometry::Polygon { ring } if ring.len() >= 3 => Some(Polygon::new(
                LineString::from(ring.iter().map(|&[lon, lat]| (lon, lat)).collect::<Vec<_>>()),
                vec![],
            )),
            _ => None,
        }
    }

    /// Point itself, or a polygon's centroid, as `(lon, lat)`.
    pub fn representative_point(&self) -> Option<(f64, f64)> {
        match &self.geometry {
            Geometry::Point { lon, lat } => Some((*lon, *lat)),
            Geometry::Polygon { .. } => self.to_geo_polygon()?.centroid().map(|p| (p.x(), p.y())),
        }
    }

    /// All vertices as `(lon, lat)`.
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        match &self.geometry {
            Geometry::Point { lon, lat } => vec![(*lon, *lat)],
            Geometry::Polygon { ring } => ring.iter().map(|&[lon, lat]| (lon, lat)).collect(),
        }
    }

    /// Area in m² (sinusoidal projection); 0 for points.
    pub fn area_m2(&self) -> f64 {
        match &self.geometry {
            Geometry::Point { .. } => 0.0,
            Geometry::Polygon { ring } => sinusoidal_area_m2(ring),
        }
    }
}

/// Semantic category of a POI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "residential")]
    Residential,
    #[serde(rename = "shop")]
    Shop,
    #[serde(rename = "commercial/industrial")]
    CommercialIndustrial,
    #[serde(rename = "leisure/amenity")]
    LeisureAmenity,
    /// Coarse-mode catch-all for every non-residential use.
    #[serde(rename = "activity")]
    Activity,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Residential => "residential",
            Category::Shop => "shop",
            Category::CommercialIndustrial => "commercial/industrial",
            Category::LeisureAmenity => "leisure/amenity",
            Category::Activity => "activity",
        }
    }

    pub fn is_activity(self) -> bool {
        self != Category::Residential
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorized point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPoi {
    pub id: FeatureId,
    pub lon: f64,
    pub lat: f64,
    pub category: Category,
    /// Tag key that decided the category.
    pub key: String,
    pub value: String,
}
