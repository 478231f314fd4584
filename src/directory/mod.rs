//! The remote parameter directory.
//!
//! [`DirectoryService`] is the async trait every backend implements.
//! [`SsmDirectory`] talks to AWS SSM Parameter Store.
//! [`InMemoryDirectory`] keeps everything in process and is what the tests
//! run against.

mod memory;
mod ssm;

pub use memory::{Call, InMemoryDirectory};
pub use ssm::SsmDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SsmError;

/// Page size used for catalog and history pagination.
pub const PAGE_SIZE: i32 = 50;

/// Storage tier of a written parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Advanced,
}

/// One request for a page of the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    /// Only names containing this substring are returned.
    pub name_contains: Option<String>,
    pub page_size: i32,
    /// Continuation token from the previous page, `None` for the first page.
    pub next_token: Option<String>,
}

/// Catalog metadata for one parameter. Never carries a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub entries: Vec<CatalogEntry>,
    /// `None` when this was the last page.
    pub next_token: Option<String>,
}

/// One request for a page of a parameter's value history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub name: String,
    pub decrypt: bool,
    pub page_size: i32,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub last_modified: DateTime<Utc>,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub entries: Vec<HistoryRecord>,
    pub next_token: Option<String>,
}

/// A write of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub name: String,
    pub value: String,
    pub overwrite: bool,
    /// Store as an encrypted secret.
    pub secret: bool,
    pub tier: Tier,
}

/// The five primitives of a remote parameter store.
///
/// Implementations never retry; every error is returned as-is.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Returns one page of catalog metadata.
    async fn describe_catalog(&self, query: CatalogQuery) -> Result<CatalogPage, SsmError>;

    /// Returns the current value of `name`.
    async fn get_value(&self, name: &str, decrypt: bool) -> Result<String, SsmError>;

    /// Returns one page of the value history of a parameter.
    async fn get_value_history(&self, query: HistoryQuery) -> Result<HistoryPage, SsmError>;

    /// Writes one parameter and returns the tier it is stored in.
    ///
    /// An advanced parameter stays advanced even when the request asks for
    /// the standard tier.
    async fn put_value(&self, request: PutRequest) -> Result<Tier, SsmError>;

    /// Deletes `name`; a missing parameter is [`SsmError::NotFound`].
    async fn delete_value(&self, name: &str) -> Result<(), SsmError>;
}
