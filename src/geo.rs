//! GCJ-02 to WGS-84 coordinate conversion.
//!
//! The vendor console reports positions in GCJ-02, the obfuscated grid used
//! by China-region map providers. The offset is deterministic, so the
//! closed-form approximation from the eviltransform formula family recovers
//! WGS-84 to within a few meters inside the covered region. The polynomial
//! coefficients below are load-bearing constants, not tunable.

use std::f64::consts::PI;

/// Semi-major axis of the reference ellipsoid, meters.
const EARTH_RADIUS: f64 = 6378137.0;
/// First eccentricity squared.
const EE: f64 = 0.006_693_421_622_965_943_23;

/// The shared polynomial-plus-trigonometric offset seed, evaluated at
/// `x = lng - 105.0`, `y = lat - 35.0`.
fn offset_seed(x: f64, y: f64) -> (f64, f64) {
    let xy = x * y;
    let abs_x = x.abs().sqrt();
    let x_pi = x * PI;
    let y_pi = y * PI;
    let d = 20.0 * (6.0 * x_pi).sin() + 20.0 * (2.0 * x_pi).sin();

    let mut lat = d;
    let mut lng = d;

    lat += 20.0 * y_pi.sin() + 40.0 * (y_pi / 3.0).sin();
    lng += 20.0 * x_pi.sin() + 40.0 * (x_pi / 3.0).sin();

    lat += 160.0 * (y_pi / 12.0).sin() + 320.0 * (y_pi / 30.0).sin();
    lng += 150.0 * (x_pi / 12.0).sin() + 300.0 * (x_pi / 30.0).sin();

    lat *= 2.0 / 3.0;
    lng *= 2.0 / 3.0;

    lat += -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * xy + 0.2 * abs_x;
    lng += 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * xy + 0.1 * abs_x;

    (lat, lng)
}

/// The GCJ-02 offset at a coordinate, in degrees.
fn offset_degrees(lat: f64, lng: f64) -> (f64, f64) {
    let (d_lat, d_lng) = offset_seed(lng - 105.0, lat - 35.0);
    let rad_lat = lat / 180.0 * PI;
    let magic = 1.0 - EE * rad_lat.sin() * rad_lat.sin();
    let sqrt_magic = magic.sqrt();
    let d_lat = (d_lat * 180.0) / ((EARTH_RADIUS * (1.0 - EE)) / (magic * sqrt_magic) * PI);
    let d_lng = (d_lng * 180.0) / (EARTH_RADIUS / sqrt_magic * rad_lat.cos() * PI);
    (d_lat, d_lng)
}

/// Convert a GCJ-02 coordinate to WGS-84.
///
/// Best-effort: outside the covered region the result is simply the offset
/// approximation, never an error. Matches vendor behavior.
pub fn gcj_to_wgs(gcj_lat: f64, gcj_lng: f64) -> (f64, f64) {
    let (d_lat, d_lng) = offset_degrees(gcj_lat, gcj_lng);
    (gcj_lat - d_lat, gcj_lng - d_lng)
}

/// The forward transform, WGS-84 to GCJ-02.
pub fn wgs_to_gcj(wgs_lat: f64, wgs_lng: f64) -> (f64, f64) {
    let (d_lat, d_lng) = offset_degrees(wgs_lat, wgs_lng);
    (wgs_lat + d_lat, wgs_lng + d_lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_1e5_degrees_inside_coverage() {
        // A grid over mainland China. The inverse is an approximation, so
        // the bound is 1e-5 degrees (about a meter), not exactness.
        let mut lat = 21.0;
        while lat <= 45.0 {
            let mut lng = 95.0;
            while lng <= 125.0 {
                let (gcj_lat, gcj_lng) = wgs_to_gcj(lat, lng);
                let (back_lat, back_lng) = gcj_to_wgs(gcj_lat, gcj_lng);
                assert!(
                    (back_lat - lat).abs() < 1e-5,
                    "lat drift at ({lat}, {lng}): {}",
                    (back_lat - lat).abs()
                );
                assert!(
                    (back_lng - lng).abs() < 1e-5,
                    "lng drift at ({lat}, {lng}): {}",
                    (back_lng - lng).abs()
                );
                lng += 2.5;
            }
            lat += 2.0;
        }
    }

    #[test]
    fn offset_is_substantial_inside_coverage() {
        // Shanghai: the GCJ-02 skew is a few hundred meters, so the
        // corrected point must move by more than a rounding error.
        let (wgs_lat, wgs_lng) = gcj_to_wgs(31.2304, 121.4737);
        assert!((wgs_lat - 31.2304).abs() > 1e-4);
        assert!((wgs_lng - 121.4737).abs() > 1e-3);
    }

    #[test]
    fn out_of_coverage_input_is_finite_and_quiet() {
        // No error contract outside the region; the result just has to be
        // a finite best-effort number.
        for (lat, lng) in [(51.5, -0.12), (-33.86, 151.2), (0.0, 0.0)] {
            let (out_lat, out_lng) = gcj_to_wgs(lat, lng);
            assert!(out_lat.is_finite() && out_lng.is_finite());
        }
    }
}
