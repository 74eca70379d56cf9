//! Run configuration. Every toggle that shapes a pipeline run lives here and
//! is passed explicitly into each stage; nothing is process-wide.

use serde::{Deserialize, Serialize};

use crate::grid::GridStep;

// ── Enums ─────────────────────────────────────────────────────────────────────

/// Category scheme used when labelling POIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// `residential`, `shop`, `commercial/industrial`, `leisure/amenity`.
    #[default]
    Fine,
    /// `residential` and `activity` only.
    Coarse,
}

/// What a phi metric's zero-division means for one LUM cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDivisionPolicy {
    /// Leave the cell as NaN and list it in the skip-list.
    #[default]
    Skip,
    /// Write 0 (no mixity) and list it in the skip-list.
    TreatAsZero,
}

/// Walking distance behind the bandwidth fallback when Scott's rule has no
/// spread to work with.
pub const DEFAULT_WALKABLE_METERS: f64 = 400.0;

/// KDE bandwidth selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthPolicy {
    /// Scott's rule per axis: `std · n^(-1/6)`.
    #[default]
    Scott,
    /// A physical distance converted to degrees at the grid centroid.
    Walkable { meters: f64 },
}

// ── Structs ───────────────────────────────────────────────────────────────────

/// Options for polygon-use inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    /// Drop inferred residential and uncertain polygons under `min_area_m2`.
    pub filter_small_residential: bool,
    /// Drop inferred activity polygons under `min_area_m2`.
    pub filter_small_activities: bool,
    pub min_area_m2: f64,
    /// Merge surviving uncertain polygons into the residential set.
    pub assume_residential_under_uncertainty: bool,
    /// Polygons per unit of parallel work. Does not affect results.
    pub chunk_size: usize,
    /// Treat a free-form `tags` attribute as uninformative when selecting
    /// polygons to infer.
    pub ignore_rows_with_tag_information: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            filter_small_residential: true,
            filter_small_activities: false,
            min_area_m2: 12.0,
            assume_residential_under_uncertainty: true,
            chunk_size: 100,
            ignore_rows_with_tag_information: true,
        }
    }
}

/// Complete parametrization of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub classification_mode: ClassificationMode,
    /// Divide each density grid by its sum.
    pub normalize_density: bool,
    /// Divide the LUM grid by its own sum.
    pub normalize_lum: bool,
    /// Registry name of the phi metric.
    pub phi_metric: String,
    pub zero_division: ZeroDivisionPolicy,
    pub bandwidth: BandwidthPolicy,
    pub grid_step: GridStep,
    /// Tiles per side when splitting features for inference.
    pub tiles_per_side: usize,
    pub inference: InferenceOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classification_mode: ClassificationMode::Fine,
            normalize_density: true,
            normalize_lum: false,
            phi_metric: "phi_entropy".to_string(),
            zero_division: ZeroDivisionPolicy::Skip,
            bandwidth: BandwidthPolicy::Scott,
            grid_step: GridStep::default(),
            tiles_per_side: 1,
            inference: InferenceOptions::default(),
        }
    }
}

/// The part of a [`PipelineConfig`] that shapes extracted POIs.
#[derive(Serialize)]
struct ExtractionSettings {
    classification_mode: ClassificationMode,
    tiles_per_side: usize,
    inference: InferenceOptions,
}

impl PipelineConfig {
    /// md5 of the settings that decide which POIs are extracted. Configs
    /// differing only in density, LUM or parallelism settings share it.
    pub fn extraction_checksum(&self) -> String {
        let settings = ExtractionSettings {
            classification_mode: self.classification_mode,
            tiles_per_side: self.tiles_per_side,
            inference: InferenceOptions { chunk_size: 0, ..self.inference.clone() },
        };
        let bytes = serde_json::to_vec(&settings).unwrap_or_default();
        let mut context = md5::Context::new();
        context.consume(&bytes);
        format!("{:x}", context.compute())
    }
}
