//! Remote tile source: HTTP client abstraction, URL templates and the
//! deduplicating remote loader.

mod http;
mod remote;
mod url;

pub use http::{HttpClient, ReqwestClient};
pub use remote::{PendingSet, RemoteTileLoader};
pub use url::{TileUrlTemplate, OSM_TILE_URL};

#[cfg(test)]
pub use http::tests::MockHttpClient;
