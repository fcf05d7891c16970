use serde::{Deserialize, Serialize};

use crate::coords::Crs;
use crate::error::{FirecastError, Result};

/// Relative tolerance (fraction of a pixel) when comparing grid geometry.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Geometry of a regular raster grid.
/// Row 0 is the southernmost row; storage is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    #[serde(default)]
    pub crs: Crs,
    pub width: usize,
    pub height: usize,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl GridSpec {
    pub fn new(crs: Crs, width: usize, height: usize, min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self { crs, width, height, min_x, max_x, min_y, max_y }
    }

    /// Unit-square grid in planar units, mostly useful for tests and synthetic runs.
    pub fn unit(width: usize, height: usize) -> Self {
        Self::new(Crs::Planar, width, height, 0.0, 1.0, 0.0, 1.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn res_x(&self) -> f64 {
        (self.max_x - self.min_x) / self.width as f64
    }

    #[inline]
    pub fn res_y(&self) -> f64 {
        (self.max_y - self.min_y) / self.height as f64
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Centre of pixel `(row, col)` as `(x, y)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_x + (col as f64 + 0.5) * self.res_x(),
            self.min_y + (row as f64 + 0.5) * self.res_y(),
        )
    }

    /// Bounds of pixel `(row, col)` as `(min_x, min_y, max_x, max_y)`.
    pub fn cell_bounds(&self, row: usize, col: usize) -> (f64, f64, f64, f64) {
        let x0 = self.min_x + col as f64 * self.res_x();
        let y0 = self.min_y + row as f64 * self.res_y();
        (x0, y0, x0 + self.res_x(), y0 + self.res_y())
    }

    /// The pixel containing `(x, y)`, or None outside the extent.
    /// Points on the max edges belong to the last row/column.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !(x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y) || self.is_empty() {
            return None;
        }
        let col = (((x - self.min_x) / self.res_x()).floor() as usize).min(self.width - 1);
        let row = (((y - self.min_y) / self.res_y()).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    /// Describe how `other` differs from this grid, or None when they align
    /// within [`GRID_TOLERANCE`] of a pixel.
    pub fn mismatch(&self, other: &GridSpec) -> Option<String> {
        if self.crs != other.crs {
            return Some(format!("crs {:?} != {:?}", other.crs, self.crs));
        }
        if self.width != other.width || self.height != other.height {
            return Some(format!(
                "size {}x{} != {}x{}",
                other.width, other.height, self.width, self.height
            ));
        }
        let tol_x = self.res_x().abs() * GRID_TOLERANCE;
        let tol_y = self.res_y().abs() * GRID_TOLERANCE;
        let edges = [
            ("min_x", self.min_x, other.min_x, tol_x),
            ("max_x", self.max_x, other.max_x, tol_x),
            ("min_y", self.min_y, other.min_y, tol_y),
            ("max_y", self.max_y, other.max_y, tol_y),
        ];
        edges
            .iter()
            .find(|(_, a, b, tol)| (a - b).abs() > *tol)
            .map(|(name, a, b, _)| format!("{name} {b} != {a}"))
    }

    pub(crate) fn validate(&self, id: &str) -> Result<()> {
        let ok = self.width > 0
            && self.height > 0
            && self.min_x.is_finite()
            && self.max_x.is_finite()
            && self.min_y.is_finite()
            && self.max_y.is_finite()
            && self.max_x > self.min_x
            && self.max_y > self.min_y;
        if ok {
            Ok(())
        } else {
            Err(FirecastError::InvalidRaster { id: id.to_string(), detail: format!("degenerate grid {self:?}") })
        }
    }
}

/// A single named band of f32 values; NaN marks no-data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    pub name: String,
    pub grid: GridSpec,
    /// Row-major values, row 0 = south. Serialised with `null` for no-data.
    #[serde(with = "nodata_as_null")]
    pub data: Vec<f32>,
}

mod nodata_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[f32], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(data.iter().map(|v| (!v.is_nan()).then_some(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
        let values = Vec::<Option<f32>>::deserialize(d)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}

impl Raster {
    /// Create a raster filled with the given value.
    pub fn filled(name: impl Into<String>, grid: GridSpec, fill: f32) -> Self {
        Self { name: name.into(), grid, data: vec![fill; grid.len()] }
    }

    pub fn from_fn(name: impl Into<String>, grid: GridSpec, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(grid.len());
        for row in 0..grid.height {
            for col in 0..grid.width {
                data.push(f(row, col));
            }
        }
        Self { name: name.into(), grid, data }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[self.grid.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        let i = self.grid.index(row, col);
        self.data[i] = val;
    }

    /// Value of the pixel containing `(x, y)`. None outside the extent or on no-data.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f32> {
        let (row, col) = self.grid.locate(x, y)?;
        let v = self.get(row, col);
        (!v.is_nan()).then_some(v)
    }

    /// Replace an explicit no-data sentinel with NaN.
    pub fn mask_value(&mut self, nodata: f32) {
        for v in &mut self.data {
            if *v == nodata {
                *v = f32::NAN;
            }
        }
    }

    pub(crate) fn validate(&self, id: &str) -> Result<()> {
        self.grid.validate(id)?;
        if self.data.len() != self.grid.len() {
            return Err(FirecastError::InvalidRaster {
                id: id.to_string(),
                detail: format!("{} values for a {}x{} grid", self.data.len(), self.grid.width, self.grid.height),
            });
        }
        Ok(())
    }
}

/// Multi-band raster: every band shares one grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterStack {
    pub name: String,
    pub grid: GridSpec,
    bands: Vec<Raster>,
}

impl RasterStack {
    pub fn new(name: impl Into<String>, grid: GridSpec) -> Self {
        Self { name: name.into(), grid, bands: Vec::new() }
    }

    /// Append a band. Fails on grid mismatch or duplicate band name.
    pub fn push(&mut self, band: Raster) -> Result<()> {
        if let Some(detail) = self.grid.mismatch(&band.grid) {
            return Err(FirecastError::GridMismatch { id: band.name.clone(), detail });
        }
        if self.band(&band.name).is_some() {
            return Err(FirecastError::DuplicateBand { stack: self.name.clone(), band: band.name.clone() });
        }
        self.bands.push(band);
        Ok(())
    }

    pub fn with_band(mut self, band: Raster) -> Result<Self> {
        self.push(band)?;
        Ok(self)
    }

    pub fn bands(&self) -> &[Raster] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Raster> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn require_band(&self, name: &str) -> Result<&Raster> {
        self.band(name)
            .ok_or_else(|| FirecastError::MissingBand { stack: self.name.clone(), band: name.to_string() })
    }

    /// Values of the named bands at `(x, y)`, in the order given.
    /// Returns the names of bands that are no-data there, or None if `(x, y)` is outside the extent.
    pub fn sample(&self, x: f64, y: f64, bands: &[&Raster]) -> Option<std::result::Result<Vec<f64>, Vec<String>>> {
        let (row, col) = self.grid.locate(x, y)?;
        let mut values = Vec::with_capacity(bands.len());
        let mut missing = Vec::new();
        for band in bands {
            let v = band.get(row, col);
            if v.is_nan() {
                missing.push(band.name.clone());
            } else {
                values.push(f64::from(v));
            }
        }
        Some(if missing.is_empty() { Ok(values) } else { Err(missing) })
    }
}
