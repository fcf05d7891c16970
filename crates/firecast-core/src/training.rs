//! Training set assembly: label, merge, and attach predictor values.
//!
//! Missing-data policy: a point outside the stack extent, or on a pixel that
//! is no-data in any predictor band, is dropped from the training set and
//! recorded in [`TrainingSet::dropped`]. No substitute value is ever used.

use serde::{Deserialize, Serialize};

use crate::error::{FirecastError, Result};
use crate::points::{Label, Point, PRESENCE_ATTR};
use crate::raster::{Raster, RasterStack};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub point: Point,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    OutsideExtent,
    NoData { bands: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedPoint {
    pub point: Point,
    pub label: Label,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// Labeled points whose attributes carry a value for every band in `bands`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSet {
    pub bands: Vec<String>,
    pub points: Vec<LabeledPoint>,
    pub dropped: Vec<DroppedPoint>,
}

impl TrainingSet {
    pub fn count(&self, label: Label) -> usize {
        self.points.iter().filter(|p| p.label == label).count()
    }

    pub fn dropped_count(&self, label: Label) -> usize {
        self.dropped.iter().filter(|p| p.label == label).count()
    }

    /// Predictor values of each point in `bands` order, with its label.
    pub fn rows(&self) -> impl Iterator<Item = (Vec<f64>, Label)> + '_ {
        self.points.iter().map(move |lp| {
            let values = self
                .bands
                .iter()
                .map(|b| lp.point.attr(b).unwrap_or(f64::NAN))
                .collect();
            (values, lp.label)
        })
    }

    /// Fail on the first point whose value for some band is missing or not finite.
    ///
    /// [`assemble`] never produces such points; sets built by hand or read
    /// back from JSON may.
    pub fn require_finite(&self) -> Result<()> {
        for (index, (values, _)) in self.rows().enumerate() {
            if let Some(b) = values.iter().position(|v| !v.is_finite()) {
                return Err(FirecastError::NonFiniteSample { index, band: self.bands[b].clone() });
            }
        }
        Ok(())
    }

    /// Fail unless both labels are represented.
    pub fn require_both_labels(&self) -> Result<()> {
        for label in [Label::Presence, Label::Background] {
            if self.count(label) == 0 {
                return Err(FirecastError::MissingLabel { label: label.name() });
            }
        }
        Ok(())
    }
}

/// Label presence (1) and background (0) points, merge them, and sample
/// `bands` of `stack` at each point.
pub fn assemble(presence: &[Point], background: &[Point], stack: &RasterStack, bands: &[String]) -> Result<TrainingSet> {
    let rasters: Vec<&Raster> = bands
        .iter()
        .map(|b| stack.require_band(b))
        .collect::<Result<_>>()?;

    let labeled = presence
        .iter()
        .map(|p| (p, Label::Presence))
        .chain(background.iter().map(|p| (p, Label::Background)));

    let mut points = Vec::with_capacity(presence.len() + background.len());
    let mut dropped = Vec::new();
    for (p, label) in labeled {
        match stack.sample(p.lon, p.lat, &rasters) {
            None => dropped.push(DroppedPoint { point: p.clone(), label, reason: DropReason::OutsideExtent }),
            Some(Err(missing)) => dropped.push(DroppedPoint {
                point: p.clone(),
                label,
                reason: DropReason::NoData { bands: missing },
            }),
            Some(Ok(values)) => {
                let mut point = p.clone();
                for (name, v) in bands.iter().zip(values) {
                    point.attributes.insert(name.clone(), v);
                }
                point.attributes.insert(PRESENCE_ATTR.to_string(), label.as_value());
                points.push(LabeledPoint { point, label });
            }
        }
    }

    if !dropped.is_empty() {
        log::warn!(
            "dropped {} training points ({} presence, {} background) outside the stack or on no-data",
            dropped.len(),
            dropped.iter().filter(|d| d.label == Label::Presence).count(),
            dropped.iter().filter(|d| d.label == Label::Background).count(),
        );
    }

    Ok(TrainingSet { bands: bands.to_vec(), points, dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;

    fn stack() -> RasterStack {
        let g = GridSpec::unit(2, 2);
        let mut soil = Raster::from_fn("SOIL1", g, |r, c| (r * 2 + c) as f32 / 10.0);
        soil.set(1, 1, f32::NAN);
        RasterStack::new("train", g)
            .with_band(Raster::from_fn("PR", g, |r, c| (r * 2 + c) as f32))
            .unwrap()
            .with_band(soil)
            .unwrap()
    }

    fn bands() -> Vec<String> {
        vec!["PR".to_string(), "SOIL1".to_string()]
    }

    #[test]
    fn labels_and_values_attached() {
        let presence = vec![Point::new(0.25, 0.25)];
        let background = vec![Point::new(0.75, 0.25).with_attr("longitude", 0.75)];
        let ts = assemble(&presence, &background, &stack(), &bands()).unwrap();

        assert_eq!(ts.points.len(), 2);
        let p = &ts.points[0];
        assert_eq!(p.label, Label::Presence);
        assert_eq!(p.point.attr("PR"), Some(0.0));
        assert_eq!(p.point.attr(PRESENCE_ATTR), Some(1.0));

        let b = &ts.points[1];
        assert_eq!(b.label, Label::Background);
        assert_eq!(b.point.attr("PR"), Some(1.0));
        assert_eq!(b.point.attr("SOIL1"), Some(f64::from(0.1f32)));
        assert_eq!(b.point.attr("longitude"), Some(0.75));
        assert_eq!(b.point.attr(PRESENCE_ATTR), Some(0.0));
    }

    #[test]
    fn outside_and_nodata_points_are_dropped_not_defaulted() {
        let presence = vec![Point::new(0.75, 0.75), Point::new(0.25, 0.75)];
        let background = vec![Point::new(3.0, 3.0)];
        let ts = assemble(&presence, &background, &stack(), &bands()).unwrap();

        assert_eq!(ts.points.len(), 1);
        assert_eq!(ts.dropped.len(), 2);
        assert_eq!(ts.dropped[0].reason, DropReason::NoData { bands: vec!["SOIL1".into()] });
        assert_eq!(ts.dropped[0].label, Label::Presence);
        assert_eq!(ts.dropped[1].reason, DropReason::OutsideExtent);
        assert_eq!(ts.dropped_count(Label::Background), 1);

        // Every kept point has a real value for every band.
        for (row, _) in ts.rows() {
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn missing_band_is_an_input_error() {
        let err = assemble(&[], &[], &stack(), &["VPD".to_string()]).unwrap_err();
        assert!(matches!(err, FirecastError::MissingBand { ref band, .. } if band == "VPD"));
    }

    #[test]
    fn missing_label_detected() {
        let ts = assemble(&[Point::new(0.25, 0.25)], &[], &stack(), &bands()).unwrap();
        assert!(matches!(
            ts.require_both_labels(),
            Err(FirecastError::MissingLabel { label: "background" })
        ));
    }
}
