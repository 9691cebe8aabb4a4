//! # Map Catalog
//!
//! Map records for the steward controller and a client for the public
//! map exchange catalog.
//!
//! * [`Map`] - a map as reported by the dedicated server, with an optional
//!   catalog record attached
//! * [`MxMapInfo`] - a catalog record
//! * [`MapSearch`] - builds catalog search queries and fetches results
//!
//! Fetching is asynchronous and uses a caller-provided
//! [`reqwest::Client`].

pub use error::CatalogError;
pub use format::strip_format_codes;
pub use map::Map;
pub use mx::MxMapInfo;
pub use search::MapSearch;

pub mod error;
pub mod format;
pub mod map;
pub mod mx;
pub mod search;
