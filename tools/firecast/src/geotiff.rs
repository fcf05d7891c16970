//! Single-band GeoTIFF → [`Raster`].
//!
//! TIFF storage order: row 0 = northernmost (N→S).
//! Raster storage order: row 0 = min_y (S→N).
//! Rows are reversed on read so that `GridSpec::locate` works unchanged.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use firecast_core::coords::Crs;
use firecast_core::{GridSpec, Raster};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

/// GDAL's private no-data tag (ASCII).
const GDAL_NODATA_TAG: u16 = 42113;
/// GeoKey holding the model type (1 = projected, 2 = geographic).
const GT_MODEL_TYPE_KEY: u16 = 1024;
const MODEL_TYPE_PROJECTED: u16 = 1;

pub fn read_geotiff(path: &Path, name: &str) -> Result<Raster> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file)).context("Not a valid TIFF")?;
    let (width, height) = decoder.dimensions().context("Cannot read TIFF dimensions")?;
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        bail!("empty {width}x{height} image");
    }

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .context("Missing ModelPixelScale tag (not georeferenced)")?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .context("Missing ModelTiepoint tag (not georeferenced)")?;
    let crs = model_crs(&mut decoder);
    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA_TAG))
        .ok()
        .and_then(|s| parse_nodata(&s));

    let img = decoder.read_image().context("Cannot decode TIFF pixels")?;
    let data = to_f32(img);
    if data.len() != width * height {
        bail!(
            "expected a single-band {}x{} image, got {} samples",
            width,
            height,
            data.len()
        );
    }

    let grid = georeference(width, height, &scale, &tiepoint, crs)?;
    let mut raster = Raster { name: name.to_string(), grid, data: flip_rows(&data, width) };
    if let Some(nd) = nodata {
        raster.mask_value(nd);
    }
    log::debug!("read {} ({}x{}, nodata {:?})", path.display(), width, height, nodata);
    Ok(raster)
}

/// Grid from a pixel-is-area tiepoint `[i, j, k, x, y, z]` and pixel scale `[sx, sy, sz]`.
fn georeference(width: usize, height: usize, scale: &[f64], tiepoint: &[f64], crs: Crs) -> Result<GridSpec> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        bail!("malformed georeferencing tags");
    }
    let (sx, sy) = (scale[0], scale[1]);
    if !(sx > 0.0 && sy > 0.0) {
        bail!("non-positive pixel scale ({sx}, {sy})");
    }
    let min_x = tiepoint[3] - tiepoint[0] * sx;
    let max_y = tiepoint[4] + tiepoint[1] * sy;
    Ok(GridSpec::new(
        crs,
        width,
        height,
        min_x,
        min_x + width as f64 * sx,
        max_y - height as f64 * sy,
        max_y,
    ))
}

fn model_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Crs {
    let Ok(keys) = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) else {
        return Crs::Geographic;
    };
    // Header is 4 shorts, then (key, location, count, value) per entry.
    for entry in keys.get(4..).unwrap_or(&[]).chunks_exact(4) {
        if entry[0] == GT_MODEL_TYPE_KEY && entry[1] == 0 {
            return if entry[3] == MODEL_TYPE_PROJECTED { Crs::Planar } else { Crs::Geographic };
        }
    }
    Crs::Geographic
}

fn parse_nodata(s: &str) -> Option<f32> {
    s.trim_matches(char::from(0)).trim().parse::<f32>().ok()
}

fn to_f32(img: DecodingResult) -> Vec<f32> {
    match img {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
    }
}

/// Reverse row order of a row-major buffer.
fn flip_rows(data: &[f32], width: usize) -> Vec<f32> {
    data.chunks_exact(width).rev().flatten().copied().collect()
}
