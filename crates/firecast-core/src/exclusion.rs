//! Spatial exclusion join: drop candidates that sit too close to a presence.
//!
//! A candidate is excluded when its distance to some presence point is
//! strictly less than the exclusion distance. A candidate at exactly the
//! exclusion distance is kept.

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::coords::Crs;
use crate::points::Point;

/// Result of [`exclude_near_presence`].
#[derive(Debug, Clone)]
pub struct ExclusionResult {
    /// Candidates farther than (or exactly at) the exclusion distance from every presence.
    pub kept: Vec<Point>,
    /// Number of candidates removed.
    pub excluded: usize,
}

/// True if `candidate` lies strictly within `distance` of any presence point.
#[inline]
pub fn is_excluded(candidate: &Point, presence: &[Point], distance: f64, crs: Crs) -> bool {
    presence
        .iter()
        .any(|p| crs.distance(candidate.lon, candidate.lat, p.lon, p.lat) < distance)
}

/// Keep the candidates whose distance to every presence point is at least `distance`.
///
/// Candidate order and attributes are preserved. `distance` is in metres for
/// geographic grids and map units for planar ones.
pub fn exclude_near_presence(candidates: &[Point], presence: &[Point], distance: f64, crs: Crs) -> ExclusionResult {
    #[cfg(feature = "threading")]
    let flags: Vec<bool> = candidates
        .par_iter()
        .map(|c| is_excluded(c, presence, distance, crs))
        .collect();
    #[cfg(not(feature = "threading"))]
    let flags: Vec<bool> = candidates
        .iter()
        .map(|c| is_excluded(c, presence, distance, crs))
        .collect();

    let kept: Vec<Point> = candidates
        .iter()
        .zip(&flags)
        .filter(|(_, &excluded)| !excluded)
        .map(|(c, _)| c.clone())
        .collect();
    let excluded = candidates.len() - kept.len();
    ExclusionResult { kept, excluded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::haversine_m;
    use crate::raster::GridSpec;
    use crate::region::Region;
    use crate::sampler::sample_candidates;

    #[test]
    fn survivors_farther_than_distance_and_excluded_within() {
        let g = GridSpec::unit(10, 10);
        let candidates = sample_candidates(&Region::from_grid(&g), &g, 60, 11);
        let presence = vec![Point::new(0.25, 0.25), Point::new(0.75, 0.65)];
        let d = 0.2;
        let res = exclude_near_presence(&candidates, &presence, d, Crs::Planar);

        for c in &res.kept {
            for p in &presence {
                assert!(Crs::Planar.distance(c.lon, c.lat, p.lon, p.lat) >= d);
            }
        }
        let excluded: Vec<&Point> = candidates.iter().filter(|c| !res.kept.contains(c)).collect();
        assert_eq!(excluded.len(), res.excluded);
        assert!(res.excluded > 0);
        for c in excluded {
            assert!(presence.iter().any(|p| Crs::Planar.distance(c.lon, c.lat, p.lon, p.lat) < d));
        }
    }

    #[test]
    fn boundary_distance_is_kept() {
        let presence = vec![Point::new(0.0, 0.0)];
        let candidates = vec![Point::new(3.0, 4.0), Point::new(2.9, 4.0)];
        let res = exclude_near_presence(&candidates, &presence, 5.0, Crs::Planar);
        assert_eq!(res.kept, vec![Point::new(3.0, 4.0)]);
        assert_eq!(res.excluded, 1);
    }

    #[test]
    fn attributes_preserved_exactly() {
        let c = Point::new(10.0, 10.0).with_attr("longitude", 10.0).with_attr("PR", 0.1 + 0.2);
        let res = exclude_near_presence(std::slice::from_ref(&c), &[Point::new(0.0, 0.0)], 1.0, Crs::Planar);
        assert_eq!(res.kept[0], c);
    }

    #[test]
    fn geographic_uses_metres() {
        // Two points 0.25° apart on the equator are ~27.8 km apart.
        let presence = vec![Point::new(-72.0, 0.0)];
        let candidate = Point::new(-71.75, 0.0);
        let d = haversine_m(0.0, -72.0, 0.0, -71.75);
        assert!(d > 25_000.0 && d < 30_000.0);
        let res = exclude_near_presence(std::slice::from_ref(&candidate), &presence, 25_000.0, Crs::Geographic);
        assert_eq!(res.kept.len(), 1);
        let res = exclude_near_presence(std::slice::from_ref(&candidate), &presence, 30_000.0, Crs::Geographic);
        assert!(res.kept.is_empty());
    }

    #[test]
    fn no_presence_keeps_everything() {
        let candidates = vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        let res = exclude_near_presence(&candidates, &[], 100.0, Crs::Planar);
        assert_eq!(res.kept, candidates);
        assert_eq!(res.excluded, 0);
    }
}
