//! Data-directory catalog: `<id>.tif` / `<id>.json` rasters and `<id>.json` point sets.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use firecast_core::{FirecastError, Point, PointCatalog, Raster, RasterCatalog};
use serde::Deserialize;

use crate::geotiff::read_geotiff;

pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, id: &str, extensions: &[&str]) -> Option<PathBuf> {
        extensions
            .iter()
            .map(|ext| self.root.join(format!("{id}.{ext}")))
            .find(|p| p.is_file())
    }
}

fn invalid(id: &str, path: &Path, err: impl std::fmt::Display) -> FirecastError {
    FirecastError::InvalidRaster { id: id.to_string(), detail: format!("{}: {err}", path.display()) }
}

impl RasterCatalog for DirectoryCatalog {
    fn load(&self, id: &str) -> firecast_core::Result<Raster> {
        if let Some(path) = self.find(id, &["tif", "tiff"]) {
            return read_geotiff(&path, id).map_err(|e| invalid(id, &path, format!("{e:#}")));
        }
        if let Some(path) = self.find(id, &["json"]) {
            let text = fs::read_to_string(&path).map_err(|e| invalid(id, &path, e))?;
            return serde_json::from_str(&text).map_err(|e| invalid(id, &path, e));
        }
        Err(FirecastError::MissingRaster { id: id.to_string() })
    }
}

// ── Point files ──────────────────────────────────────────────────────────────

/// Either a plain array of points or a GeoJSON FeatureCollection of Point features.
#[derive(Deserialize)]
#[serde(untagged)]
enum PointFile {
    Points(Vec<Point>),
    Features { features: Vec<Feature> },
}

#[derive(Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

fn feature_point(f: Feature) -> Option<Point> {
    if f.geometry.kind != "Point" {
        return None;
    }
    let coords = f.geometry.coordinates.as_array()?;
    let (lon, lat) = (coords.first()?.as_f64()?, coords.get(1)?.as_f64()?);
    let mut p = Point::new(lon, lat);
    // Only numeric properties become attributes.
    for (k, v) in f.properties.unwrap_or_default() {
        if let Some(x) = v.as_f64() {
            p.attributes.insert(k, x);
        }
    }
    Some(p)
}

impl PointCatalog for DirectoryCatalog {
    fn load_points(&self, id: &str) -> firecast_core::Result<Vec<Point>> {
        let Some(path) = self.find(id, &["json", "geojson"]) else {
            return Err(FirecastError::MissingPoints { id: id.to_string() });
        };
        let bad = |detail: String| FirecastError::InvalidPoints { id: id.to_string(), detail };
        let text = fs::read_to_string(&path).map_err(|e| bad(format!("{}: {e}", path.display())))?;
        let file: PointFile =
            serde_json::from_str(&text).map_err(|e| bad(format!("{}: not a point collection: {e}", path.display())))?;
        Ok(match file {
            PointFile::Points(points) => points,
            PointFile::Features { features } => {
                let total = features.len();
                let points: Vec<Point> = features.into_iter().filter_map(feature_point).collect();
                if points.len() < total {
                    log::warn!("{}: skipped {} non-point features", path.display(), total - points.len());
                }
                points
            }
        })
    }
}
