//! Land-use mix analysis over tagged geographic features.
//!
//! Features are classified into activity and residential POIs, untagged
//! building polygons inherit the use of their smallest enclosing land-use
//! region, and per-category kernel densities feed a land-use-mix (LUM) grid
//! and its spatial summaries.

pub mod analysis;
pub mod cache;
pub mod classify;
pub mod config;
pub mod coords;
pub mod error;
pub mod feature;
pub mod field;
pub mod grid;
pub mod indices;
pub mod infer;
pub mod kde;
pub mod lum;
pub mod pipeline;
pub mod population;
pub mod raster;
pub mod store;
pub mod tiling;

pub use analysis::{Analysis, AnalysisReport};
pub use config::PipelineConfig;
pub use error::{LumError, Result};
pub use feature::{Category, ClassifiedPoi, Feature};
pub use pipeline::{extract_pois, extraction_cache_key, Extraction};
