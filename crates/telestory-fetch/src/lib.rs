//! Outbound HTTP for telestory: the story catalog query and the concurrent
//! media downloads that follow it.
//!
//! ```rust,ignore
//! let catalog = CatalogClient::new(catalog_config)?.fetch("@alice", &token).await?;
//! let outcomes = MediaFetcher::new(fetcher_config)?
//!     .fetch_all(&catalog.base_url, catalog.items, &token)
//!     .await;
//! ```

pub mod catalog;
pub mod deadline;
pub mod error;
pub mod media;
pub mod scratch;

pub use catalog::{Catalog, CatalogClient, CatalogConfig, CatalogItem, normalize_identifier};
pub use deadline::{Deadline, Interrupted, bounded};
pub use error::{FailureKind, FetchError};
pub use media::{FetchOutcome, MediaFetcher, MediaFetcherConfig};
pub use scratch::ScratchFile;
