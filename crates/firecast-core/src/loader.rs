//! Raster stack loading from named sources.
//!
//! Sources are resolved through [`RasterCatalog`]; the core crate ships an
//! in-memory catalog and callers supply file- or service-backed ones.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{FirecastError, Result};
use crate::points::Point;
use crate::raster::{GridSpec, Raster, RasterStack};

/// Resolves raster identifiers.
pub trait RasterCatalog {
    /// Load the raster stored under `id`. An unknown id is [`FirecastError::MissingRaster`].
    fn load(&self, id: &str) -> Result<Raster>;
}

/// Resolves named point collections.
pub trait PointCatalog {
    /// An unknown id is [`FirecastError::MissingPoints`].
    fn load_points(&self, id: &str) -> Result<Vec<Point>>;
}

/// One band of a stack: the source id and an optional rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInput {
    pub id: String,
    /// Band name in the stack; defaults to the source raster's own name.
    #[serde(default, alias = "rename")]
    pub band: Option<String>,
}

impl StackInput {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), band: None }
    }

    pub fn renamed(id: impl Into<String>, band: impl Into<String>) -> Self {
        Self { id: id.into(), band: Some(band.into()) }
    }
}

/// Load `inputs` into one stack named `name`.
///
/// Every raster must match `reference` (or the first input's grid when no
/// reference is given) within [`crate::raster::GRID_TOLERANCE`] of a pixel.
pub fn load_stack(
    catalog: &dyn RasterCatalog,
    name: &str,
    inputs: &[StackInput],
    reference: Option<&GridSpec>,
) -> Result<RasterStack> {
    let mut stack: Option<RasterStack> = None;
    let mut reference = reference.copied();
    for input in inputs {
        let mut raster = catalog.load(&input.id)?;
        raster.validate(&input.id)?;
        if let Some(band) = &input.band {
            raster.name = band.clone();
        }

        let grid = *reference.get_or_insert(raster.grid);
        if let Some(detail) = grid.mismatch(&raster.grid) {
            return Err(FirecastError::GridMismatch { id: input.id.clone(), detail });
        }
        // Snap within-tolerance grids onto the reference so bands compare equal.
        raster.grid = grid;

        match stack.as_mut() {
            Some(s) => s.push(raster)?,
            None => stack = Some(RasterStack::new(name, grid).with_band(raster)?),
        }
    }

    let stack = match stack {
        Some(s) => s,
        None => {
            let grid = reference.ok_or_else(|| {
                FirecastError::invalid_config("stack", format!("stack '{name}' has no inputs"))
            })?;
            RasterStack::new(name, grid)
        }
    };
    log::debug!("loaded stack '{}' with bands [{}]", stack.name, stack.band_names().join(", "));
    Ok(stack)
}

/// Rasters and point collections held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    rasters: HashMap<String, Raster>,
    points: HashMap<String, Vec<Point>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raster(&mut self, id: impl Into<String>, raster: Raster) {
        self.rasters.insert(id.into(), raster);
    }

    pub fn insert_points(&mut self, id: impl Into<String>, points: Vec<Point>) {
        self.points.insert(id.into(), points);
    }

    pub fn with_raster(mut self, id: impl Into<String>, raster: Raster) -> Self {
        self.insert_raster(id, raster);
        self
    }

    pub fn with_points(mut self, id: impl Into<String>, points: Vec<Point>) -> Self {
        self.insert_points(id, points);
        self
    }
}

impl RasterCatalog for InMemoryCatalog {
    fn load(&self, id: &str) -> Result<Raster> {
        self.rasters
            .get(id)
            .cloned()
            .ok_or_else(|| FirecastError::MissingRaster { id: id.to_string() })
    }
}

impl PointCatalog for InMemoryCatalog {
    fn load_points(&self, id: &str) -> Result<Vec<Point>> {
        self.points
            .get(id)
            .cloned()
            .ok_or_else(|| FirecastError::MissingPoints { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Crs;

    fn catalog() -> InMemoryCatalog {
        let g = GridSpec::unit(4, 4);
        InMemoryCatalog::new()
            .with_raster("T2M_JAS2021", Raster::filled("T2M_JAS2021", g, 20.0))
            .with_raster("PR_JAS2021", Raster::filled("PR_JAS2021", g, 1.5))
            .with_raster("T2M_OND2021", Raster::filled("T2M_OND2021", g, 18.0))
    }

    #[test]
    fn renames_bands_and_keeps_order() {
        let inputs = [StackInput::renamed("T2M_JAS2021", "T2M"), StackInput::renamed("PR_JAS2021", "PR")];
        let stack = load_stack(&catalog(), "train", &inputs, None).unwrap();
        assert_eq!(stack.band_names(), vec!["T2M", "PR"]);
        assert_eq!(stack.band("PR").unwrap().get(0, 0), 1.5);
    }

    #[test]
    fn missing_id_is_named() {
        let err = load_stack(&catalog(), "train", &[StackInput::new("VPD_JAS2021")], None).unwrap_err();
        assert!(matches!(err, FirecastError::MissingRaster { ref id } if id == "VPD_JAS2021"));
        assert!(err.to_string().contains("VPD_JAS2021"));
    }

    #[test]
    fn grid_mismatch_rejected() {
        let mut cat = catalog();
        cat.insert_raster("coarse", Raster::filled("coarse", GridSpec::unit(2, 2), 1.0));
        let inputs = [StackInput::new("T2M_JAS2021"), StackInput::new("coarse")];
        let err = load_stack(&cat, "train", &inputs, None).unwrap_err();
        assert!(matches!(err, FirecastError::GridMismatch { ref id, .. } if id == "coarse"));

        let shifted = GridSpec::new(Crs::Planar, 4, 4, 0.1, 1.1, 0.0, 1.0);
        assert!(load_stack(&catalog(), "f", &[StackInput::new("T2M_OND2021")], Some(&shifted)).is_err());
    }

    #[test]
    fn mismatch_names_source_id_not_band() {
        let mut cat = catalog();
        cat.insert_raster("PR_OND2021", Raster::filled("PR_OND2021", GridSpec::unit(2, 2), 1.0));
        let inputs = [StackInput::renamed("T2M_JAS2021", "T2M"), StackInput::renamed("PR_OND2021", "PR")];
        let err = load_stack(&cat, "train", &inputs, None).unwrap_err();
        assert!(matches!(err, FirecastError::GridMismatch { ref id, .. } if id == "PR_OND2021"));
        assert!(err.to_string().contains("PR_OND2021"), "{err}");
    }

    #[test]
    fn later_bands_snap_to_first_grid() {
        let g = GridSpec::unit(4, 4);
        let nudged = GridSpec::new(Crs::Planar, 4, 4, 1e-9, 1.0, 0.0, 1.0 + 1e-9);
        let cat = InMemoryCatalog::new()
            .with_raster("a", Raster::filled("a", g, 1.0))
            .with_raster("b", Raster::filled("b", nudged, 2.0));
        let stack = load_stack(&cat, "s", &[StackInput::new("a"), StackInput::new("b")], None).unwrap();
        assert_eq!(stack.band("b").unwrap().grid, g);
    }

    #[test]
    fn tiny_offsets_are_tolerated() {
        let g = GridSpec::unit(4, 4);
        let nudged = GridSpec::new(Crs::Planar, 4, 4, 1e-9, 1.0, 0.0, 1.0 + 1e-9);
        let cat = InMemoryCatalog::new().with_raster("a", Raster::filled("a", nudged, 1.0));
        let stack = load_stack(&cat, "s", &[StackInput::new("a")], Some(&g)).unwrap();
        assert_eq!(stack.grid, g);
        assert_eq!(stack.bands()[0].grid, g);
    }

    #[test]
    fn duplicate_band_rejected() {
        let inputs = [StackInput::renamed("T2M_JAS2021", "T"), StackInput::renamed("T2M_OND2021", "T")];
        let err = load_stack(&catalog(), "mixed", &inputs, None).unwrap_err();
        assert!(matches!(err, FirecastError::DuplicateBand { ref band, .. } if band == "T"));
    }

    #[test]
    fn points_catalog() {
        let cat = InMemoryCatalog::new().with_points("fires", vec![Point::new(1.0, 2.0)]);
        assert_eq!(cat.load_points("fires").unwrap().len(), 1);
        assert!(matches!(cat.load_points("other"), Err(FirecastError::MissingPoints { .. })));
    }

    #[test]
    fn stack_input_json_accepts_rename_alias() {
        let a: StackInput = serde_json::from_str(r#"{"id": "PR_OND2021", "rename": "PR"}"#).unwrap();
        let b: StackInput = serde_json::from_str(r#"{"id": "PR_OND2021"}"#).unwrap();
        assert_eq!(a, StackInput::renamed("PR_OND2021", "PR"));
        assert_eq!(b.band, None);
    }
}
