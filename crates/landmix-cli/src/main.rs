/// Land-use mix runner: reads a JSON feature collection, extracts POIs,
/// estimates densities and the LUM grid, and writes a JSON report.
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use landmix_core::analysis::{Analysis, AnalysisReport};
use landmix_core::cache::{load_or_compute, JsonDirCache};
use landmix_core::config::PipelineConfig;
use landmix_core::coords::BoundingBox;
use landmix_core::feature::Category;
use landmix_core::indices::SpatialWeights;
use landmix_core::pipeline::{extract_pois, extraction_cache_key, Extraction};
use landmix_core::population::{downscale_population, DownscaleReport, PopulationPoint};
use landmix_core::raster::MemoryRaster;
use landmix_core::store::{FeatureCollection, FeatureStore, MemoryFeatureStore};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "landmix", about = "Land-use mix analysis over a JSON feature collection")]
struct Args {
    /// Feature collection JSON ({"features": [...]})
    #[arg(short, long)]
    features: PathBuf,

    /// Pipeline configuration JSON; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// City name, part of the cache key
    #[arg(long, default_value = "city")]
    city: String,

    /// Cache directory for extracted POIs (omit to disable caching)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Study area as lat_min,lon_min,lat_max,lon_max (default: feature extent)
    #[arg(long, value_delimiter = ',', num_args = 4)]
    bbox: Option<Vec<f64>>,

    /// Population raster JSON to downscale onto residential POIs
    #[arg(long)]
    population: Option<PathBuf>,

    /// Spatial-weight distance cutoff in degrees
    #[arg(long)]
    weight_cutoff: Option<f64>,

    /// Output report path
    #[arg(short, long, default_value = "landmix_report.json")]
    output: PathBuf,
}

// ── Report ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InferenceSummary {
    activity: usize,
    residential: usize,
    uncertain: usize,
    other: usize,
    filtered_small: usize,
    promoted: usize,
    ties: usize,
}

#[derive(Serialize)]
struct RunReport {
    city: String,
    features: usize,
    unclassified: usize,
    land_use_regions: usize,
    inference: InferenceSummary,
    analysis: AnalysisReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    population: Option<DownscaleReport>,
    /// Residential POIs with their share of the raster population.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    population_points: Vec<PopulationPoint>,
}

fn inference_summary(e: &Extraction) -> InferenceSummary {
    let r = &e.inference;
    InferenceSummary {
        activity: r.activity.len(),
        residential: r.residential.len(),
        uncertain: r.uncertain.len(),
        other: r.other.len(),
        filtered_small: r.filtered_small.len(),
        promoted: r.promoted,
        ties: r.ties,
    }
}

/// Downscale `raster` onto the residential POIs of `extraction`.
fn populate_residential(raster: &MemoryRaster, extraction: &Extraction) -> (Vec<PopulationPoint>, DownscaleReport) {
    let residential: Vec<_> =
        extraction.pois.iter().filter(|p| p.category == Category::Residential).cloned().collect();
    downscale_population(raster, &residential)
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    let collection = FeatureCollection::from_json_file(&args.features)
        .with_context(|| format!("Cannot load features from {}", args.features.display()))?;

    let bbox = match args.bbox.as_deref() {
        Some(&[lat_min, lon_min, lat_max, lon_max]) => {
            BoundingBox::new(lat_min, lon_min, lat_max, lon_max).context("Invalid --bbox")?
        }
        Some(other) => bail!("--bbox takes 4 values, got {}", other.len()),
        None => match collection.extent() {
            Some(b) => b,
            None => bail!("{} holds no features", args.features.display()),
        },
    };
    let features = MemoryFeatureStore::from(collection).read(&bbox)?;
    log::info!("{}: {} features in study area", args.city, features.len());

    let extraction = match &args.cache_dir {
        Some(dir) => {
            let mut cache = JsonDirCache::new(dir);
            load_or_compute(&mut cache, &extraction_cache_key(&args.city, &config), || {
                Ok(extract_pois(&features, &config))
            })
            .context("POI extraction failed")?
        }
        None => extract_pois(&features, &config),
    };
    for (category, count) in &extraction.counts {
        log::info!("  {category}: {count}");
    }

    let (population_points, population) = match &args.population {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
            let raster: MemoryRaster =
                serde_json::from_str(&text).with_context(|| format!("Failed to parse raster {}", path.display()))?;
            let (points, report) = populate_residential(&raster, &extraction);
            (points, Some(report))
        }
        None => (Vec::new(), None),
    };

    let mut analysis = Analysis::new(extraction.pois.clone(), bbox, config);
    let weights = SpatialWeights { cutoff: args.weight_cutoff };
    let analysis_report = analysis.report(weights).context("Land-use mix analysis failed")?;

    let report = RunReport {
        city: args.city.clone(),
        features: features.len(),
        unclassified: extraction.unclassified.len(),
        land_use_regions: extraction.land_use_regions,
        inference: inference_summary(&extraction),
        analysis: analysis_report,
        population,
        population_points,
    };
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&args.output, json).with_context(|| format!("Cannot write {}", args.output.display()))?;
    eprintln!("[landmix] report written to {}", args.output.display());
    Ok(())
}
