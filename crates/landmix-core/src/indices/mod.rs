//! Scalar summaries of gridded fields: entropy, spatial autocorrelation and
//! dissimilarity.

pub mod autocorrelation;
pub mod dissimilarity;
pub mod entropy;
pub mod preprocess;

pub use autocorrelation::{adjusted_geary, geary_index, moran_index, SpatialWeights};
pub use dissimilarity::dissimilarity;
pub use entropy::{relative_entropy, shannon_entropy};
pub use preprocess::{cell_average, cell_poi_counts, midpoint_coords};

use serde::{Deserialize, Serialize};

use crate::error::{LumError, Result};
use crate::field::GridField;
use crate::grid::Grid;

/// What a summarized field holds; decides which indices apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// Node-valued density, averaged onto cells first.
    Density,
    /// Per-cell POI counts from [`cell_poi_counts`].
    Count,
    /// Node-valued LUM grid. Entropy and dissimilarity do not apply.
    Lum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialSummary {
    pub kind: SummaryKind,
    pub entropy: Option<f64>,
    pub relative_entropy: Option<f64>,
    pub moran: f64,
    pub geary: f64,
    pub adjusted_geary: f64,
    /// Against the reference field, when one was given.
    pub dissimilarity: Option<f64>,
}

fn expect_shape(field: &GridField, expected: (usize, usize)) -> Result<()> {
    if field.shape() != expected {
        return Err(LumError::ShapeMismatch { expected, actual: field.shape() });
    }
    Ok(())
}

/// Reduce `field` to the indices meaningful for `kind`.
///
/// `reference` (same kind and shape) enables the dissimilarity index.
pub fn summarize(
    grid: &Grid,
    field: &GridField,
    kind: SummaryKind,
    reference: Option<&GridField>,
    weights: SpatialWeights,
) -> Result<SpatialSummary> {
    let node_shape = grid.shape();
    let cell_shape = (node_shape.0.saturating_sub(1), node_shape.1.saturating_sub(1));

    let (values, reference, coords) = match kind {
        SummaryKind::Density => {
            expect_shape(field, node_shape)?;
            let reference = match reference {
                Some(r) => {
                    expect_shape(r, node_shape)?;
                    Some(cell_average(r))
                }
                None => None,
            };
            (cell_average(field), reference, midpoint_coords(grid))
        }
        SummaryKind::Count => {
            expect_shape(field, cell_shape)?;
            if let Some(r) = reference {
                expect_shape(r, cell_shape)?;
            }
            (field.clone(), reference.cloned(), midpoint_coords(grid))
        }
        SummaryKind::Lum => {
            expect_shape(field, node_shape)?;
            (field.clone(), None, grid.coords())
        }
    };

    let (entropy, rel) = match kind {
        SummaryKind::Lum => (None, None),
        _ => (Some(shannon_entropy(&values.data)), Some(relative_entropy(&values.data))),
    };
    let moran = moran_index(&values.data, &coords, weights)?;
    let geary = geary_index(&values.data, &coords, weights)?;
    let dissimilarity = match &reference {
        Some(r) => Some(dissimilarity(&values, r)?),
        None => None,
    };

    log::debug!("{kind:?} summary: moran {moran:.4}, geary {geary:.4}");
    Ok(SpatialSummary {
        kind,
        entropy,
        relative_entropy: rel,
        moran,
        geary,
        adjusted_geary: -(geary - 1.0),
        dissimilarity,
    })
}
