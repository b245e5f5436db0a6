//! `regi` - Registrar course catalog client
//!
//! # Features
//!
//! - **Catalog lookups**: semesters, schools, levels, departments, subjects,
//!   instructors and breadths, with ID lookup
//! - **Course search**: the catalog's `getSearchData` form payload, built from
//!   typed filters
//! - **PDF documents**: schedules, final exams and course requirements
//!   extracted from ruled tables into `table` or `columns` JSON
//! - **Published semester**: scraped from the course-schedules page
//!
//! # Example
//!
//! ```rust,no_run
//! use regi::{JsonShape, RegistrarClient, SearchFilters};
//!
//! #[tokio::main]
//! async fn main() -> regi::Result<()> {
//!     let client = RegistrarClient::new()?;
//!     let semester = client.latest_semester().await?;
//!
//!     let filters = SearchFilters::new(20)?.semester(semester.id.clone()).subject("CSCI");
//!     let courses = client.search(&filters).await?;
//!     println!("{courses}");
//!
//!     let schedule = client
//!         .schedule_json(JsonShape::Table, &semester.id, None, None)
//!         .await?;
//!     println!("{schedule}");
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod http_client;
pub mod scrape;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{build_search_payload, Entity, EntityKind, Lookup, SearchFilters, SearchPayload};
pub use client::RegistrarClient;
pub use config::ClientConfig;
pub use document::{
    DocumentKind, DocumentRequest, ExtractError, ExtractOptions, ExtractedTable, JsonShape, LatticeExtractor,
    PageTable, TableExtractor, TextEncoding,
};
pub use error::{ErrorKind, RegistrarError, Result};
pub use http_client::{HttpTransport, Transport, TransportResponse};
pub use scrape::parse_last_published_semester;

/// Version of regi
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
