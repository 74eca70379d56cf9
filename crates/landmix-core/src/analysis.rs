//! A study area and its derived products.
//!
//! [`Analysis`] owns the POIs, the bounding box and the run configuration.
//! The grid, the densities and the LUM grid are computed on first use and
//! kept until an input they depend on changes:
//!
//!   bbox, grid step, POIs → grid → densities → LUM
//!   bandwidth, density normalization → densities → LUM
//!   phi metric, zero-division policy, LUM normalization → LUM

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::category_counts;
use crate::config::{BandwidthPolicy, PipelineConfig, ZeroDivisionPolicy};
use crate::coords::BoundingBox;
use crate::error::{LumError, Result};
use crate::feature::{Category, ClassifiedPoi};
use crate::grid::{build_grid, Grid, GridStep};
use crate::indices::{cell_poi_counts, summarize, SpatialSummary, SpatialWeights, SummaryKind};
use crate::kde::{distinct_points, estimate_density_by_category, DensitySet, SkippedCategory, ACTIVITY_AGGREGATE};
use crate::lum::{compute_lum, compute_phi_summary, LumGrid, LumOptions, PhiRegistry};

/// Fill `slot` with `compute()` if empty and borrow the value.
fn cached<T>(slot: &mut Option<T>, compute: impl FnOnce() -> Result<T>) -> Result<&T> {
    let value = match slot.take() {
        Some(v) => v,
        None => compute()?,
    };
    Ok(slot.insert(value))
}

fn missing_density(pois: &[ClassifiedPoi], label: &str, wanted: impl Fn(Category) -> bool) -> LumError {
    let points: Vec<(f64, f64)> = pois.iter().filter(|p| wanted(p.category)).map(|p| (p.lon, p.lat)).collect();
    LumError::InsufficientData { category: label.to_string(), distinct: distinct_points(&points) }
}

fn lum_from(densities: &DensitySet, pois: &[ClassifiedPoi], config: &PipelineConfig, registry: &PhiRegistry) -> Result<LumGrid> {
    let activity = densities
        .activity
        .as_ref()
        .ok_or_else(|| missing_density(pois, ACTIVITY_AGGREGATE, |c| c.is_activity()))?;
    let residential = densities
        .residential()
        .ok_or_else(|| missing_density(pois, Category::Residential.as_str(), |c| c == Category::Residential))?;
    let opts = LumOptions { zero_division: config.zero_division, normalize: config.normalize_lum };
    compute_lum(activity, residential, &config.phi_metric, registry, opts)
}

/// Serializable digest of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub bbox: BoundingBox,
    pub grid_shape: (usize, usize),
    pub poi_counts: BTreeMap<Category, usize>,
    pub skipped_categories: Vec<SkippedCategory>,
    pub phi_metric: String,
    pub phi_summary: f64,
    /// LUM cells where the metric divided by zero.
    pub skipped_cells: usize,
    pub lum: SpatialSummary,
    /// Activity density, with dissimilarity against residential density.
    pub activity_density: SpatialSummary,
    /// Activity POI counts per cell, with dissimilarity against residential counts.
    pub activity_counts: SpatialSummary,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    config: PipelineConfig,
    registry: PhiRegistry,
    pois: Vec<ClassifiedPoi>,
    bbox: BoundingBox,
    grid: Option<Grid>,
    densities: Option<DensitySet>,
    lum: Option<LumGrid>,
}

impl Analysis {
    pub fn new(pois: Vec<ClassifiedPoi>, bbox: BoundingBox, config: PipelineConfig) -> Self {
        Self {
            config,
            registry: PhiRegistry::default(),
            pois,
            bbox,
            grid: None,
            densities: None,
            lum: None,
        }
    }

    /// Analysis over the extent of `pois`.
    pub fn from_pois(pois: Vec<ClassifiedPoi>, config: PipelineConfig) -> Result<Self> {
        let bbox = BoundingBox::from_points(pois.iter().map(|p| (p.lon, p.lat)))
            .ok_or_else(|| LumError::InvalidBoundingBox("no POIs to take an extent from".into()))?;
        Ok(Self::new(pois, bbox, config))
    }

    /// Replace the phi metric registry, e.g. to add a custom metric.
    pub fn with_registry(mut self, registry: PhiRegistry) -> Self {
        self.registry = registry;
        self.lum = None;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pois(&self) -> &[ClassifiedPoi] {
        &self.pois
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn poi_counts(&self) -> BTreeMap<Category, usize> {
        category_counts(&self.pois)
    }

    // ── Setters ───────────────────────────────────────────────────────────────

    fn invalidate_grid(&mut self) {
        self.grid = None;
        self.invalidate_densities();
    }

    fn invalidate_densities(&mut self) {
        self.densities = None;
        self.lum = None;
    }

    pub fn set_grid_step(&mut self, step: GridStep) {
        self.config.grid_step = step;
        self.invalidate_grid();
    }

    pub fn set_bbox(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
        self.invalidate_grid();
    }

    /// Shrink the study area to `bbox`, dropping the POIs outside it.
    pub fn reduce_bbox(&mut self, bbox: BoundingBox) {
        let before = self.pois.len();
        self.pois.retain(|p| bbox.contains(p.lon, p.lat));
        log::info!("reduced study area: kept {} of {before} POIs", self.pois.len());
        self.set_bbox(bbox);
    }

    pub fn set_pois(&mut self, pois: Vec<ClassifiedPoi>) {
        self.pois = pois;
        self.invalidate_grid();
    }

    pub fn set_bandwidth(&mut self, policy: BandwidthPolicy) {
        self.config.bandwidth = policy;
        self.invalidate_densities();
    }

    pub fn set_normalize_density(&mut self, normalize: bool) {
        self.config.normalize_density = normalize;
        self.invalidate_densities();
    }

    pub fn set_phi_metric(&mut self, name: &str) {
        self.config.phi_metric = name.to_string();
        self.lum = None;
    }

    pub fn set_zero_division(&mut self, policy: ZeroDivisionPolicy) {
        self.config.zero_division = policy;
        self.lum = None;
    }

    pub fn set_normalize_lum(&mut self, normalize: bool) {
        self.config.normalize_lum = normalize;
        self.lum = None;
    }

    // ── Products ──────────────────────────────────────────────────────────────

    pub fn grid(&mut self) -> Result<&Grid> {
        let (bbox, step) = (&self.bbox, self.config.grid_step);
        cached(&mut self.grid, || build_grid(bbox, step))
    }

    pub fn densities(&mut self) -> Result<&DensitySet> {
        let Self { config, pois, bbox, grid, densities, .. } = self;
        let config: &PipelineConfig = config;
        let pois: &[ClassifiedPoi] = pois;
        let grid = cached(grid, || build_grid(bbox, config.grid_step))?;
        cached(densities, || estimate_density_by_category(pois, grid, config.bandwidth, config.normalize_density))
    }

    /// LUM grid of the activity aggregate against residential density.
    ///
    /// Fails with [`LumError::InsufficientData`] when either density was
    /// skipped.
    pub fn lum(&mut self) -> Result<&LumGrid> {
        Ok(self.products()?.2)
    }

    /// Mean LUM over the finite cells.
    pub fn phi_summary(&mut self) -> Result<f64> {
        Ok(compute_phi_summary(self.lum()?))
    }

    fn products(&mut self) -> Result<(&Grid, &DensitySet, &LumGrid)> {
        let Self { config, registry, pois, bbox, grid, densities, lum } = self;
        let config: &PipelineConfig = config;
        let pois: &[ClassifiedPoi] = pois;
        let grid = cached(grid, || build_grid(bbox, config.grid_step))?;
        let densities =
            cached(densities, || estimate_density_by_category(pois, grid, config.bandwidth, config.normalize_density))?;
        let lum = cached(lum, || lum_from(densities, pois, config, registry))?;
        Ok((grid, densities, lum))
    }

    /// Compute every product and summarize it.
    pub fn report(&mut self, weights: SpatialWeights) -> Result<AnalysisReport> {
        let poi_counts = self.poi_counts();
        let activity_points: Vec<(f64, f64)> =
            self.pois.iter().filter(|p| p.category.is_activity()).map(|p| (p.lon, p.lat)).collect();
        let residential_points: Vec<(f64, f64)> = self
            .pois
            .iter()
            .filter(|p| p.category == Category::Residential)
            .map(|p| (p.lon, p.lat))
            .collect();
        let (bbox, metric) = (self.bbox, self.config.phi_metric.clone());

        let (grid, densities, lum) = self.products()?;
        // Both densities exist once the LUM grid does.
        let (Some(activity), Some(residential)) = (densities.activity.as_ref(), densities.residential()) else {
            return Err(LumError::InsufficientData { category: ACTIVITY_AGGREGATE.to_string(), distinct: 0 });
        };

        let lum_summary = summarize(grid, &lum.field, SummaryKind::Lum, None, weights)?;
        let activity_density = summarize(grid, activity, SummaryKind::Density, Some(residential), weights)?;
        let activity_counts = summarize(
            grid,
            &cell_poi_counts(grid, &activity_points),
            SummaryKind::Count,
            Some(&cell_poi_counts(grid, &residential_points)),
            weights,
        )?;

        let report = AnalysisReport {
            bbox,
            grid_shape: grid.shape(),
            poi_counts,
            skipped_categories: densities.skipped.clone(),
            phi_metric: metric,
            phi_summary: compute_phi_summary(lum),
            skipped_cells: lum.skipped.len(),
            lum: lum_summary,
            activity_density,
            activity_counts,
        };
        log::info!(
            "{} over a {}x{} grid: phi summary {:.4}",
            report.phi_metric,
            report.grid_shape.0,
            report.grid_shape.1,
            report.phi_summary
        );
        Ok(report)
    }
}
