//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (longitude/latitude)
//! and the pixel/tile space of the XYZ tiling scheme used by raster map
//! servers. The functions here are the spherical Web Mercator fast path;
//! the [`projection`] submodule offers the same mapping behind a pluggable
//! strategy for callers that need an explicit projected plane.

pub mod projection;
mod types;

pub use projection::{Projection, WebMercator};
pub use types::{
    LonLat, PixelPoint, TileCoord, TileId, MAX_LAT, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM,
    TILE_SIZE,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to global pixel coordinates at a zoom level.
///
/// Longitude maps linearly; latitude goes through the inverse Mercator
/// transform. The poles are special-cased: +90° maps to `pixel_y = 0` and
/// -90° maps to the bottom edge of the pixel space, avoiding a logarithm
/// with an empty domain.
#[inline]
pub fn lonlat_to_pixel(point: LonLat, zoom: u8, tile_size: u32) -> PixelPoint {
    let scale = 2.0_f64.powi(zoom as i32) * tile_size as f64;
    let x = (point.lon + 180.0) / 360.0 * scale;
    let y = if point.lat >= 90.0 {
        0.0
    } else if point.lat <= -90.0 {
        scale
    } else {
        let sin_lat = point.lat.to_radians().sin();
        (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * scale
    };
    PixelPoint::new(x, y)
}

/// Converts global pixel coordinates to fractional tile coordinates.
#[inline]
pub fn pixel_to_tile(point: PixelPoint, zoom: u8, tile_size: u32) -> TileCoord {
    TileCoord::new(
        zoom,
        point.x / tile_size as f64,
        point.y / tile_size as f64,
    )
}

/// Converts geographic coordinates to fractional tile coordinates.
#[inline]
pub fn lonlat_to_tile(point: LonLat, zoom: u8, tile_size: u32) -> TileCoord {
    pixel_to_tile(lonlat_to_pixel(point, zoom, tile_size), zoom, tile_size)
}

/// Converts fractional tile coordinates back to geographic coordinates.
///
/// The longitude result is normalized into `[-180, 180)`, so tile columns
/// past the antimeridian wrap around the globe.
#[inline]
pub fn tile_to_lonlat(tile: TileCoord) -> LonLat {
    let n = 2.0_f64.powi(tile.z as i32);
    let lon = ((tile.xf / n) * 360.0 - 180.0 + 180.0).rem_euclid(360.0) - 180.0;
    let lat = (PI - 2.0 * PI * tile.yf / n).sinh().atan().to_degrees();
    LonLat::new(lon, lat)
}

/// Converts global pixel coordinates back to geographic coordinates.
#[inline]
pub fn pixel_to_lonlat(point: PixelPoint, zoom: u8, tile_size: u32) -> LonLat {
    tile_to_lonlat(pixel_to_tile(point, zoom, tile_size))
}
