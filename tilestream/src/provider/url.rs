//! Tile URL templates.

use std::fmt;

use tracing::error;

use crate::coord::TileId;

/// Default tile source: the public OpenStreetMap raster endpoint.
pub const OSM_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// URL template with `{z}`, `{x}` and `{y}` placeholders.
///
/// The template also determines the source key used to namespace the disk
/// cache, so tiles from different servers never collide on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileUrlTemplate {
    template: String,
}

impl TileUrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The raw template string.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Expands the template for one tile.
    pub fn url_for(&self, id: TileId) -> String {
        self.template
            .replace("{z}", &id.z.to_string())
            .replace("{x}", &id.x.to_string())
            .replace("{y}", &id.y.to_string())
    }

    /// Host component of the template, used as the per-source cache
    /// directory name. Falls back to `"unknown"` when the template has no
    /// parseable host.
    pub fn source_key(&self) -> String {
        let rest = match self.template.split_once("://") {
            Some((_, rest)) => rest,
            None => {
                error!(template = %self.template, "tile URL has no scheme, using 'unknown' cache key");
                return "unknown".to_string();
            }
        };
        let host = rest
            .split(['/', '?'])
            .next()
            .unwrap_or_default()
            // A port separator is not a valid path character everywhere.
            .replace(':', "_");
        if host.is_empty() {
            error!(template = %self.template, "tile URL has no host, using 'unknown' cache key");
            "unknown".to_string()
        } else {
            host
        }
    }
}

impl Default for TileUrlTemplate {
    fn default() -> Self {
        Self::new(OSM_TILE_URL)
    }
}

impl fmt::Display for TileUrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
