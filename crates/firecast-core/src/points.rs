use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute holding the binary label on assembled training points.
pub const PRESENCE_ATTR: &str = "presence";

/// A located record: `(lon, lat)` in geographic grids, `(x, y)` in planar ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat, attributes: BTreeMap::new() }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }
}

/// Training label. Presence = observed fire, Background = sampled location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Background,
    Presence,
}

impl Label {
    pub fn as_value(self) -> f64 {
        match self {
            Label::Presence => 1.0,
            Label::Background => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Label::Presence => "presence",
            Label::Background => "background",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_roundtrip_through_json() {
        let p = Point::new(-72.5, 0.75).with_attr("PR", 0.0123).with_attr(PRESENCE_ATTR, 1.0);
        let json = serde_json::to_string(&p).unwrap();
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
        assert_eq!(back.attr("PR"), Some(0.0123));
    }

    #[test]
    fn attributes_default_to_empty() {
        let p: Point = serde_json::from_str(r#"{"lon": 1.0, "lat": 2.0}"#).unwrap();
        assert!(p.attributes.is_empty());
    }

    #[test]
    fn label_values() {
        assert_eq!(Label::Presence.as_value(), 1.0);
        assert_eq!(Label::Background.as_value(), 0.0);
    }
}
