//! Catalog API for Tidecast.
//!
//! Typed models for the home screen and search, and a [`CatalogService`]
//! that fetches them through a [`tidecast_net::RequestExecutor`].
//!
//! ```ignore
//! use tidecast_catalog::{CatalogService, SectionContent};
//! use tidecast_net::{ClientConfig, RequestExecutor};
//!
//! let executor = RequestExecutor::builder(ClientConfig::new("https://api.tidecast.fm"))
//!     .standard_interceptors()
//!     .build()?;
//! let catalog = CatalogService::new(executor);
//!
//! for section in catalog.home_sections(1).await?.sections {
//!     if let SectionContent::Podcasts(podcasts) = section.content {
//!         println!("{}: {} shows", section.name, podcasts.len());
//!     }
//! }
//! ```

pub mod models;
mod service;

pub use models::{
    Article, Audiobook, ContentKind, Episode, HomeSection, HomeSectionsResponse, Pagination,
    Podcast, SearchResults, SectionContent, SectionLayout,
};
pub use service::CatalogService;
