use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Map info is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid search URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog answered with HTTP {0}")]
    Status(u16),

    #[error("Cannot decode searched JSON data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Search response has no results list")]
    MissingResults,
}
