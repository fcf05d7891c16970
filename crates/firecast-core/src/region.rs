//! Region of interest: a polygon with optional holes in the grid's CRS.
//!
//! Rings are lists of `[x, y]` vertices; closing the ring (repeating the first
//! vertex) is optional. Containment uses the even-odd rule across all rings, so
//! a point inside a hole is outside the region.
use serde::{Deserialize, Serialize};

use crate::error::{FirecastError, Result};
use crate::raster::GridSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub exterior: Vec<[f64; 2]>,
    #[serde(default)]
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl Region {
    pub fn new(exterior: Vec<[f64; 2]>) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    /// Axis-aligned rectangle.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y]])
    }

    /// The full extent of a grid.
    pub fn from_grid(grid: &GridSpec) -> Self {
        Self::rectangle(grid.min_x, grid.min_y, grid.max_x, grid.max_y)
    }

    pub fn with_hole(mut self, hole: Vec<[f64; 2]>) -> Self {
        self.holes.push(hole);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for ring in self.rings() {
            if distinct_vertices(ring) < 3 {
                return Err(FirecastError::InvalidRegion(format!(
                    "ring with {} distinct vertices (need at least 3)",
                    distinct_vertices(ring)
                )));
            }
            if ring.iter().flatten().any(|v| !v.is_finite()) {
                return Err(FirecastError::InvalidRegion("non-finite vertex".into()));
            }
        }
        Ok(())
    }

    fn rings(&self) -> impl Iterator<Item = &Vec<[f64; 2]>> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    fn edges(&self) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
        self.rings().flat_map(|ring| {
            let n = ring.len();
            (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
        })
    }

    /// Even-odd point-in-polygon test (ray cast towards +x).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a[1] > y) != (b[1] > y) {
                let x_cross = a[0] + (y - a[1]) / (b[1] - a[1]) * (b[0] - a[0]);
                if x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True if the rectangle `[min_x, max_x] × [min_y, max_y]` overlaps the region.
    pub fn intersects_rect(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> bool {
        let cx = 0.5 * (min_x + max_x);
        let cy = 0.5 * (min_y + max_y);
        let corners = [[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y]];

        if self.contains(cx, cy) || corners.iter().any(|c| self.contains(c[0], c[1])) {
            return true;
        }
        // A polygon vertex strictly inside the rectangle.
        let inside_rect = |p: &[f64; 2]| p[0] > min_x && p[0] < max_x && p[1] > min_y && p[1] < max_y;
        if self.exterior.iter().any(inside_rect) {
            return true;
        }
        // A polygon edge crossing a rectangle edge.
        let rect_edges = [
            (corners[0], corners[1]),
            (corners[1], corners[2]),
            (corners[2], corners[3]),
            (corners[3], corners[0]),
        ];
        self.edges().any(|(a, b)| {
            rect_edges.iter().any(|&(c, d)| segments_cross(a, b, c, d))
        })
    }

    /// True if pixel `(row, col)` of `grid` overlaps the region.
    pub fn intersects_cell(&self, grid: &GridSpec, row: usize, col: usize) -> bool {
        let (x0, y0, x1, y1) = grid.cell_bounds(row, col);
        self.intersects_rect(x0, y0, x1, y1)
    }
}

fn distinct_vertices(ring: &[[f64; 2]]) -> usize {
    let mut seen: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for v in ring {
        if !seen.contains(v) {
            seen.push(*v);
        }
    }
    seen.len()
}

fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Proper crossing of open segments ab and cd (touching endpoints do not count).
fn segments_cross(a: [f64; 2], b: [f64; 2], c: [f64; 2], d: [f64; 2]) -> bool {
    let d1 = orient(c, d, a);
    let d2 = orient(c, d, b);
    let d3 = orient(a, b, c);
    let d4 = orient(a, b, d);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0)) && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Region {
        Region::new(vec![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]])
    }

    #[test]
    fn contains_triangle_interior() {
        let t = triangle();
        assert!(t.contains(1.0, 1.0));
        assert!(!t.contains(3.0, 3.0));
        assert!(!t.contains(-1.0, 1.0));
    }

    #[test]
    fn hole_is_outside() {
        let r = Region::rectangle(0.0, 0.0, 10.0, 10.0)
            .with_hole(vec![[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0]]);
        assert!(r.contains(1.0, 1.0));
        assert!(!r.contains(5.0, 5.0));
    }

    #[test]
    fn rect_partially_covered_intersects() {
        // Sliver polygon crossing a cell without covering its centre or corners.
        let sliver = Region::new(vec![[0.1, -1.0], [0.2, -1.0], [0.2, 2.0], [0.1, 2.0]]);
        assert!(!sliver.contains(0.5, 0.5));
        assert!(!sliver.contains(0.25, 0.5));
        assert!(sliver.intersects_rect(0.0, 0.0, 1.0, 1.0));
        assert!(!sliver.intersects_rect(0.6, 0.0, 1.0, 1.0));
    }

    #[test]
    fn small_polygon_inside_cell_intersects() {
        let tiny = Region::new(vec![[0.1, 0.1], [0.2, 0.1], [0.2, 0.2]]);
        assert!(tiny.intersects_rect(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn cell_fully_inside_hole_is_excluded() {
        let r = Region::rectangle(0.0, 0.0, 1.0, 1.0)
            .with_hole(vec![[0.5, 0.5], [1.0, 0.5], [1.0, 1.0], [0.5, 1.0]]);
        let g = GridSpec::unit(4, 4);
        assert!(!r.intersects_cell(&g, 3, 3));
        assert!(r.intersects_cell(&g, 0, 0));
    }

    #[test]
    fn validate_rejects_degenerate_ring() {
        assert!(Region::new(vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]).validate().is_err());
        assert!(triangle().validate().is_ok());
    }
}
