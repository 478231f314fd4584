//! The listing pipeline.
//!
//! Pages through the catalog, optionally resolves each parameter's value (and
//! history) on a bounded worker pool, then sorts everything once and renders
//! rows. A page's fetches are all joined before the next page is requested.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::directory::{CatalogEntry, CatalogQuery, DirectoryService, HistoryQuery, PAGE_SIZE};
use crate::error::SsmError;
use crate::parameter::{HistoryEntry, Parameter, Row};
use crate::pool::WorkerPool;

/// Concurrent fetches when only values are resolved.
pub const VALUE_WORKERS: usize = 2;

/// Concurrent fetches when history is resolved too. Each job makes at least
/// two round-trips, so they run one at a time.
pub const HISTORY_WORKERS: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Oldest first; equal timestamps fall back to name order.
    #[default]
    LastModified,
    /// Case-sensitive ordinal order.
    Name,
}

/// What a single listing fetches and how it is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    /// Names must contain this substring; empty lists everything.
    pub filter: String,
    pub resolve_values: bool,
    /// Only valid together with `resolve_values`.
    pub resolve_history: bool,
    pub sort: SortKey,
    pub show_timestamp: bool,
    /// Display only the last path segment of each name.
    pub strip_prefix: bool,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            filter: String::new(),
            resolve_values: false,
            resolve_history: false,
            sort: SortKey::LastModified,
            show_timestamp: true,
            strip_prefix: false,
        }
    }
}

impl ListingRequest {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    pub fn with_values(mut self, on: bool) -> Self {
        self.resolve_values = on;
        self
    }

    pub fn with_history(mut self, on: bool) -> Self {
        self.resolve_history = on;
        self
    }

    pub fn with_stripped_names(mut self, on: bool) -> Self {
        self.strip_prefix = on;
        self
    }

    /// Sorts by timestamp and shows it, or sorts by name and hides it.
    pub fn sort_by_timestamp(mut self, on: bool) -> Self {
        self.sort = if on { SortKey::LastModified } else { SortKey::Name };
        self.show_timestamp = on;
        self
    }

    /// Number of fetches allowed in flight at once.
    pub fn worker_limit(&self) -> usize {
        if self.resolve_history {
            HISTORY_WORKERS
        } else {
            VALUE_WORKERS
        }
    }

    pub fn validate(&self) -> Result<(), SsmError> {
        if self.resolve_history && !self.resolve_values {
            return Err(SsmError::Validation(
                "history can only be shown together with values".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs a listing and renders one row per parameter.
pub async fn list<D>(
    directory: Arc<D>,
    request: &ListingRequest,
    cancel: &CancellationToken,
) -> Result<Vec<Row>, SsmError>
where
    D: DirectoryService + ?Sized + 'static,
{
    let params = collect(directory, request, cancel).await?;
    Ok(format_rows(&params, request))
}

/// Runs a listing and returns the sorted parameters.
///
/// Nothing is returned if any fetch fails; the error names the failing keys.
#[tracing::instrument(
    skip(directory, request, cancel),
    fields(
        filter = %request.filter,
        values = request.resolve_values,
        history = request.resolve_history
    )
)]
pub async fn collect<D>(
    directory: Arc<D>,
    request: &ListingRequest,
    cancel: &CancellationToken,
) -> Result<Vec<Parameter>, SsmError>
where
    D: DirectoryService + ?Sized + 'static,
{
    request.validate()?;

    let name_contains = (!request.filter.is_empty()).then(|| request.filter.clone());
    let mut pool = WorkerPool::new(request.worker_limit(), cancel.clone());
    let mut params = Vec::new();
    let mut next_token = None;
    let mut pages = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(SsmError::Cancelled);
        }

        let query = CatalogQuery {
            name_contains: name_contains.clone(),
            page_size: PAGE_SIZE,
            next_token: next_token.take(),
        };
        let page = tokio::select! {
            page = directory.describe_catalog(query) => page?,
            _ = cancel.cancelled() => return Err(SsmError::Cancelled),
        };
        pages += 1;
        debug!(page = pages, entries = page.entries.len(), "Catalog page fetched");

        if request.resolve_values {
            for entry in page.entries {
                let label = entry.name.clone();
                pool.submit(
                    label,
                    resolve(Arc::clone(&directory), entry, request.resolve_history),
                );
            }
            params.extend(pool.join().await?);
        } else {
            params.extend(
                page.entries
                    .into_iter()
                    .map(|e| Parameter::new(e.name, e.last_modified)),
            );
        }

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    sort_parameters(&mut params, request.sort);
    info!(count = params.len(), pages, "Listing complete");
    Ok(params)
}

/// Fetches the value, and optionally the history, of one catalog entry.
async fn resolve<D>(
    directory: Arc<D>,
    entry: CatalogEntry,
    with_history: bool,
) -> Result<Parameter, SsmError>
where
    D: DirectoryService + ?Sized,
{
    let value = directory.get_value(&entry.name, true).await?;
    let parameter = Parameter::new(entry.name, entry.last_modified).with_value(value);
    if !with_history {
        return Ok(parameter);
    }
    let versions = history(directory.as_ref(), &parameter.name).await?;
    Ok(parameter.with_history(versions))
}

/// Reads the complete, decrypted value history of `name`.
pub async fn history<D>(directory: &D, name: &str) -> Result<Vec<HistoryEntry>, SsmError>
where
    D: DirectoryService + ?Sized,
{
    let mut entries = Vec::new();
    let mut next_token = None;
    loop {
        let page = directory
            .get_value_history(HistoryQuery {
                name: name.to_string(),
                decrypt: true,
                page_size: PAGE_SIZE,
                next_token: next_token.take(),
            })
            .await?;
        entries.extend(page.entries.into_iter().map(|h| HistoryEntry {
            last_modified: h.last_modified,
            value: h.value,
        }));
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => return Ok(entries),
        }
    }
}

pub fn sort_parameters(params: &mut [Parameter], key: SortKey) {
    match key {
        SortKey::LastModified => params.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.name.cmp(&b.name))
        }),
        SortKey::Name => params.sort_by(|a, b| a.name.cmp(&b.name)),
    }
}

pub fn format_rows(params: &[Parameter], request: &ListingRequest) -> Vec<Row> {
    params
        .iter()
        .map(|p| p.to_row(request.show_timestamp, request.strip_prefix))
        .collect()
}
