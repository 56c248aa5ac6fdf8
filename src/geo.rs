//! Geodesy helpers: great-circle distance and the local tangent-plane
//! projection used to place entities in the viewer's frame.
//!
//! Both are spherical approximations (mean Earth radius). They are good to a
//! few metres over the few kilometres a viewer ever sees, and degrade with
//! distance from the reference point and with reference latitude.

use crate::types::{GeoPoint, LocalPoint};

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in metres (haversine).
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

/// Equirectangular projection anchored at a reference point.
///
/// The reference is captured from the first coordinate ever projected unless
/// one was set explicitly, and it is never rebased automatically afterwards.
#[derive(Debug, Clone, Default)]
pub struct CoordinateProjector {
    reference: Option<GeoPoint>,
}

impl CoordinateProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(reference: GeoPoint) -> Self {
        Self {
            reference: Some(reference),
        }
    }

    pub fn reference(&self) -> Option<GeoPoint> {
        self.reference
    }

    pub fn set_reference(&mut self, lat: f64, lng: f64) {
        log::debug!("projector reference set to ({lat:.6}, {lng:.6})");
        self.reference = Some(GeoPoint::new(lat, lng));
    }

    /// Project `(lat, lng)` into metres east (`x`) / north (`y`) of the reference.
    pub fn project(&mut self, lat: f64, lng: f64) -> LocalPoint {
        let reference = *self.reference.get_or_insert_with(|| {
            log::debug!("projector reference captured at ({lat:.6}, {lng:.6})");
            GeoPoint::new(lat, lng)
        });
        project_from(reference, lat, lng)
    }

    pub fn project_point(&mut self, point: GeoPoint) -> LocalPoint {
        self.project(point.lat, point.lng)
    }
}

fn project_from(reference: GeoPoint, lat: f64, lng: f64) -> LocalPoint {
    let x = (lng - reference.lng).to_radians() * EARTH_RADIUS_M * reference.lat.to_radians().cos();
    let y = (lat - reference.lat).to_radians() * EARTH_RADIUS_M;
    LocalPoint::new(x, y)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SF: GeoPoint = GeoPoint {
        lat: 37.7749,
        lng: -122.4194,
    };

    #[test]
    fn haversine_zero_for_identical_points() {
        assert_eq!(haversine_m(SF, SF), 0.0);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((haversine_m(a, b) - expected).abs() < 1e-6);
    }

    #[test]
    fn haversine_is_symmetric() {
        let other = GeoPoint::new(37.7790, -122.4150);
        assert!((haversine_m(SF, other) - haversine_m(other, SF)).abs() < 1e-9);
    }

    #[test]
    fn first_projection_captures_reference() {
        let mut p = CoordinateProjector::new();
        assert!(p.reference().is_none());

        let origin = p.project(SF.lat, SF.lng);
        assert_eq!(origin, LocalPoint::origin());
        assert_eq!(p.reference(), Some(SF));

        // Later projections never rebase.
        p.project(40.0, -100.0);
        assert_eq!(p.reference(), Some(SF));
    }

    #[test]
    fn small_longitude_offset_matches_closed_form() {
        let mut p = CoordinateProjector::with_reference(SF);
        let delta = 0.001;
        let pt = p.project(SF.lat, SF.lng + delta);

        let expected_x =
            delta * std::f64::consts::PI / 180.0 * EARTH_RADIUS_M * (SF.lat.to_radians()).cos();
        assert!((pt.x - expected_x).abs() < 1e-6, "x = {}", pt.x);
        assert!(pt.y.abs() < 1e-9, "y = {}", pt.y);
    }

    #[test]
    fn latitude_offset_moves_north() {
        let mut p = CoordinateProjector::with_reference(SF);
        let pt = p.project(SF.lat + 0.001, SF.lng);
        assert!(pt.x.abs() < 1e-9);
        assert!((pt.y - 111.19).abs() < 0.01, "y = {}", pt.y);
    }

    #[test]
    fn set_reference_overrides_captured_point() {
        let mut p = CoordinateProjector::new();
        p.project(10.0, 10.0);
        p.set_reference(SF.lat, SF.lng);
        assert_eq!(p.project(SF.lat, SF.lng), LocalPoint::origin());
    }

    #[test]
    fn projection_agrees_with_haversine_nearby() {
        let mut p = CoordinateProjector::with_reference(SF);
        let other = GeoPoint::new(37.7760, -122.4180);
        let local = p.project_point(other);
        let planar = local.distance_to(&LocalPoint::origin());
        let great_circle = haversine_m(SF, other);
        assert!((planar - great_circle).abs() < 0.5);
    }
}
