//! Pluggable projection strategy.
//!
//! The free functions in [`crate::coord`] are the spherical fast path used
//! by the tile pipeline. This module exposes the same mapping as an
//! explicit two-step strategy: geographic coordinates to a projected
//! planar system, then a zoom-dependent linear scale to pixel space. A
//! caller working against a named coordinate reference system can swap in
//! its own transform while keeping the pixel math.

use std::f64::consts::PI;

use super::types::{LonLat, PixelPoint, MAX_LAT, MIN_LAT};

/// Equatorial radius of the WGS84 ellipsoid, in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// A point on the projected plane, in the projection's linear units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
}

impl ProjectedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Bidirectional mapping between geographic coordinates and a square
/// projected plane.
///
/// `to_projected` and `from_projected` must be exact inverses up to
/// floating-point precision. The provided pixel conversions place the
/// plane's north-west corner at pixel `(0, 0)` and scale it by
/// `resolution(zoom, tile_size)` units per pixel.
pub trait Projection {
    /// Transform geographic coordinates to the projected plane.
    fn to_projected(&self, point: LonLat) -> ProjectedPoint;

    /// Transform projected coordinates back to geographic coordinates.
    fn from_projected(&self, point: ProjectedPoint) -> LonLat;

    /// Distance from the center of the projected plane to its edge.
    fn half_extent(&self) -> f64;

    /// Projected units covered by one pixel at the given zoom.
    fn resolution(&self, zoom: u8, tile_size: u32) -> f64 {
        let pixels = tile_size as f64 * 2.0_f64.powi(zoom as i32);
        2.0 * self.half_extent() / pixels
    }

    /// Convert projected coordinates to pixel coordinates at a zoom level.
    fn projected_to_pixel(&self, point: ProjectedPoint, zoom: u8, tile_size: u32) -> PixelPoint {
        let res = self.resolution(zoom, tile_size);
        let he = self.half_extent();
        PixelPoint::new((point.x + he) / res, (he - point.y) / res)
    }

    /// Convert pixel coordinates to projected coordinates at a zoom level.
    fn pixel_to_projected(&self, pixel: PixelPoint, zoom: u8, tile_size: u32) -> ProjectedPoint {
        let res = self.resolution(zoom, tile_size);
        let he = self.half_extent();
        ProjectedPoint::new(pixel.x * res - he, he - pixel.y * res)
    }

    /// Convert geographic coordinates straight to pixel coordinates.
    fn lonlat_to_pixel(&self, point: LonLat, zoom: u8, tile_size: u32) -> PixelPoint {
        self.projected_to_pixel(self.to_projected(point), zoom, tile_size)
    }

    /// Convert pixel coordinates straight to geographic coordinates.
    fn pixel_to_lonlat(&self, pixel: PixelPoint, zoom: u8, tile_size: u32) -> LonLat {
        self.from_projected(self.pixel_to_projected(pixel, zoom, tile_size))
    }
}

/// Web Mercator (EPSG:3857) on a sphere of the WGS84 equatorial radius.
///
/// Latitude is clamped to the projection's valid range before the
/// transform, so inputs near the poles produce the plane's edge rather
/// than an infinity.
#[derive(Debug, Clone, Copy)]
pub struct WebMercator {
    radius: f64,
}

impl WebMercator {
    pub fn new() -> Self {
        Self {
            radius: EARTH_RADIUS_M,
        }
    }

    /// Use a custom sphere radius (projected units stay meters).
    pub fn with_radius(radius: f64) -> Self {
        Self { radius }
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for WebMercator {
    fn to_projected(&self, point: LonLat) -> ProjectedPoint {
        let lat = point.lat.clamp(MIN_LAT, MAX_LAT);
        let x = self.radius * point.lon.to_radians();
        let y = self.radius * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        ProjectedPoint::new(x, y)
    }

    fn from_projected(&self, point: ProjectedPoint) -> LonLat {
        let lon = (point.x / self.radius).to_degrees();
        let lat = (2.0 * (point.y / self.radius).exp().atan() - PI / 2.0).to_degrees();
        LonLat::new(lon, lat)
    }

    fn half_extent(&self) -> f64 {
        PI * self.radius
    }
}
