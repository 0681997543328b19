use thiserror::Error;

/// Failure to retrieve a page. Always recoverable: the URL is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'plants' table does not exist in {0}; run `plant_scraper init` first")]
    MissingTable(String),
}
