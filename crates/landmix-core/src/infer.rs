//! Polygon-use inference by smallest enclosing land-use region.
//!
//! A building polygon carrying nothing but `building=yes` takes the use of
//! the smallest tagged land-use region that contains it. Candidates are
//! sorted by ascending area once; each polygon then scans them linearly and
//! stops at the first container. The scan is independent per polygon, so it
//! is split into chunks and run in parallel under the `threading` feature,
//! with results reassembled in input order.

use std::collections::HashMap;

use geo::{BoundingRect, Contains, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::classify::{classify, is_land_use_region, INFERRED_KEY, LANDUSE_ACTIVITIES, LANDUSE_OTHER, LANDUSE_RESIDENTIAL};
use crate::config::{ClassificationMode, InferenceOptions};
use crate::feature::{Category, ClassifiedPoi, Feature, FeatureId};

/// Tags that never make a `building=yes` polygon informative.
const UNINFORMATIVE_TAGS: &[&str] = &["building", "name", "osm_id", "way_area", "z_order"];

// ── Candidates ────────────────────────────────────────────────────────────────

/// Use carried by an enclosing land-use region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLabel {
    Residential,
    /// Cemetery, water, green space and the like.
    Other,
    /// The activity land use itself, e.g. `retail` or `industrial`.
    Activity(String),
}

impl RegionLabel {
    /// Label of a `landuse` value, or `None` if it is not a known region use.
    pub fn from_landuse(value: &str) -> Option<Self> {
        if LANDUSE_RESIDENTIAL.contains(&value) {
            Some(RegionLabel::Residential)
        } else if LANDUSE_ACTIVITIES.contains(&value) {
            Some(RegionLabel::Activity(value.to_string()))
        } else if LANDUSE_OTHER.contains(&value) {
            Some(RegionLabel::Other)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateRegion {
    pub id: FeatureId,
    pub polygon: Polygon<f64>,
    pub label: RegionLabel,
    /// Area in m², the sort key.
    pub area_m2: f64,
    rect: Rect<f64>,
}

impl CandidateRegion {
    fn may_contain(&self, rect: &Rect<f64>) -> bool {
        let (a, b) = (self.rect, rect);
        a.min().x <= b.min().x && a.min().y <= b.min().y && a.max().x >= b.max().x && a.max().y >= b.max().y
    }
}

/// Build the area-sorted candidate list from tagged land-use regions.
///
/// Features that are not land-use regions are skipped. The sort is stable,
/// so equal-area candidates keep their input order.
pub fn candidate_regions<'a, I>(features: I) -> Vec<CandidateRegion>
where
    I: IntoIterator<Item = &'a Feature>,
{
    let mut candidates: Vec<CandidateRegion> = features
        .into_iter()
        .filter(|f| is_land_use_region(f))
        .filter_map(|f| {
            let label = RegionLabel::from_landuse(f.tag("landuse")?)?;
            let polygon = f.to_geo_polygon()?;
            let rect = polygon.bounding_rect()?;
            Some(CandidateRegion { id: f.id, polygon, label, area_m2: f.area_m2(), rect })
        })
        .collect();
    candidates.sort_by(|a, b| a.area_m2.total_cmp(&b.area_m2));
    log::debug!("{} candidate regions", candidates.len());
    candidates
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Polygons tagged `building=yes` and nothing else informative.
pub fn polygons_to_infer<'a, I>(features: I, opts: &InferenceOptions) -> Vec<&'a Feature>
where
    I: IntoIterator<Item = &'a Feature>,
{
    features
        .into_iter()
        .filter(|f| f.is_polygon() && f.tag("building") == Some("yes"))
        .filter(|f| {
            f.tags.iter().all(|(k, v)| {
                UNINFORMATIVE_TAGS.contains(&k.as_str())
                    || (opts.ignore_rows_with_tag_information && k == "tags")
                    || v.trim().is_empty()
            })
        })
        .collect()
}

// ── Containment search ────────────────────────────────────────────────────────

/// Smallest container found for one polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Containment {
    /// Index into the sorted candidate list.
    pub candidate: usize,
    /// Another candidate of equal area also contains the polygon.
    pub tied: bool,
}

/// First (smallest) candidate whose geometry contains `polygon`.
pub fn smallest_enclosing(candidates: &[CandidateRegion], polygon: &Polygon<f64>) -> Option<Containment> {
    let rect = polygon.bounding_rect()?;
    let contains = |c: &CandidateRegion| c.may_contain(&rect) && c.polygon.contains(polygon);
    let idx = candidates.iter().position(contains)?;
    let area = candidates[idx].area_m2;
    let tied = candidates[idx + 1..]
        .iter()
        .take_while(|c| c.area_m2 == area)
        .any(contains);
    Some(Containment { candidate: idx, tied })
}

/// [`smallest_enclosing`] for every polygon, in input order.
///
/// `chunk_size` only sets the unit of parallel work; the output does not
/// depend on it.
pub fn containing_regions(
    candidates: &[CandidateRegion],
    polygons: &[Option<Polygon<f64>>],
    chunk_size: usize,
) -> Vec<Option<Containment>> {
    let chunk_size = chunk_size.max(1);
    let search = |chunk: &[Option<Polygon<f64>>]| -> Vec<Option<Containment>> {
        chunk
            .iter()
            .map(|p| p.as_ref().and_then(|p| smallest_enclosing(candidates, p)))
            .collect()
    };

    #[cfg(feature = "threading")]
    let per_chunk: Vec<Vec<Option<Containment>>> = {
        use rayon::prelude::*;
        polygons.par_chunks(chunk_size).map(search).collect()
    };
    #[cfg(not(feature = "threading"))]
    let per_chunk: Vec<Vec<Option<Containment>>> = polygons.chunks(chunk_size).map(search).collect();

    log::debug!("containment search over {} chunk(s) of {}", per_chunk.len(), chunk_size);
    per_chunk.into_iter().flatten().collect()
}

// ── Inference ─────────────────────────────────────────────────────────────────

/// Terminal state of one polygon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceOutcome {
    Activity(String),
    Residential,
    /// Enclosed by a region that is neither residential nor an activity.
    Other,
    /// No enclosing region.
    Uncertain,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// `(polygon, activity land use)` pairs.
    pub activity: Vec<(FeatureId, String)>,
    pub residential: Vec<FeatureId>,
    /// Uncertain polygons left after filtering and promotion.
    pub uncertain: Vec<FeatureId>,
    pub other: Vec<FeatureId>,
    /// Polygons dropped by the small-building filter.
    pub filtered_small: Vec<FeatureId>,
    /// Uncertain polygons merged into `residential`.
    pub promoted: usize,
    /// Polygons whose smallest container had an equal-area rival.
    pub ties: usize,
}

impl InferenceResult {
    /// Append another batch, e.g. a second tile.
    pub fn merge(&mut self, mut other: InferenceResult) {
        self.activity.append(&mut other.activity);
        self.residential.append(&mut other.residential);
        self.uncertain.append(&mut other.uncertain);
        self.other.append(&mut other.other);
        self.filtered_small.append(&mut other.filtered_small);
        self.promoted += other.promoted;
        self.ties += other.ties;
    }

    pub fn labelled(&self) -> usize {
        self.activity.len() + self.residential.len()
    }
}

/// Infer a use for each polygon from the area-sorted `candidates`.
///
/// Order of operations: containment search, small-building filter, then
/// promotion of the surviving uncertain polygons to residential.
pub fn infer_polygon_uses(
    polygons: &[&Feature],
    candidates: &[CandidateRegion],
    opts: &InferenceOptions,
) -> InferenceResult {
    let geometries: Vec<Option<Polygon<f64>>> = polygons.iter().map(|f| f.to_geo_polygon()).collect();
    let matches = containing_regions(candidates, &geometries, opts.chunk_size);

    let mut result = InferenceResult::default();
    for (feature, found) in polygons.iter().zip(matches) {
        let outcome = match found {
            Some(m) => {
                if m.tied {
                    result.ties += 1;
                }
                match &candidates[m.candidate].label {
                    RegionLabel::Residential => InferenceOutcome::Residential,
                    RegionLabel::Other => InferenceOutcome::Other,
                    RegionLabel::Activity(v) => InferenceOutcome::Activity(v.clone()),
                }
            }
            None => InferenceOutcome::Uncertain,
        };

        let filter = match outcome {
            InferenceOutcome::Residential | InferenceOutcome::Uncertain => opts.filter_small_residential,
            InferenceOutcome::Activity(_) => opts.filter_small_activities,
            InferenceOutcome::Other => false,
        };
        if filter && feature.area_m2() < opts.min_area_m2 {
            result.filtered_small.push(feature.id);
            continue;
        }

        match outcome {
            InferenceOutcome::Activity(v) => result.activity.push((feature.id, v)),
            InferenceOutcome::Residential => result.residential.push(feature.id),
            InferenceOutcome::Other => result.other.push(feature.id),
            InferenceOutcome::Uncertain => result.uncertain.push(feature.id),
        }
    }

    if opts.assume_residential_under_uncertainty {
        result.promoted = result.uncertain.len();
        result.residential.append(&mut result.uncertain);
    }

    if result.ties > 0 {
        log::debug!("{} polygon(s) had equal-area enclosing regions; first match kept", result.ties);
    }
    log::info!(
        "inferred {} polygons: {} activity, {} residential ({} promoted), {} uncertain, {} other, {} filtered as small",
        polygons.len(),
        result.activity.len(),
        result.residential.len(),
        result.promoted,
        result.uncertain.len(),
        result.other.len(),
        result.filtered_small.len()
    );
    result
}

/// POIs for the inferred polygons, at their centroids, under key `inferred`.
pub fn inferred_pois(polygons: &[&Feature], result: &InferenceResult, mode: ClassificationMode) -> Vec<ClassifiedPoi> {
    let by_id: HashMap<FeatureId, &Feature> = polygons.iter().map(|f| (f.id, *f)).collect();
    let labelled = result
        .activity
        .iter()
        .map(|(id, v)| (*id, v.as_str()))
        .chain(result.residential.iter().map(|id| (*id, "residential")));

    labelled
        .filter_map(|(id, value)| {
            let (lon, lat) = by_id.get(&id)?.representative_point()?;
            let category = classify(INFERRED_KEY, value, mode).unwrap_or(Category::Activity);
            Some(ClassifiedPoi {
                id,
                lon,
                lat,
                category,
                key: INFERRED_KEY.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
