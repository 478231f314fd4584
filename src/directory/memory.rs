use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    CatalogEntry, CatalogPage, CatalogQuery, DirectoryService, HistoryPage, HistoryQuery,
    HistoryRecord, PutRequest, Tier,
};
use crate::error::SsmError;

#[derive(Debug, Clone)]
struct Stored {
    name: String,
    last_modified: DateTime<Utc>,
    value: String,
    tier: Tier,
    secret: bool,
    history: Vec<HistoryRecord>,
}

/// A directory call as recorded by [`InMemoryDirectory::calls`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// A catalog page was requested.
    Describe,
    /// The value fetch of the named parameter finished.
    Value(String),
}

/// An in-process [`DirectoryService`].
///
/// The catalog is returned in insertion order, so listings that come back
/// sorted prove the pipeline sorted them. Continuation tokens are decimal
/// offsets; anything else is rejected as a transport error. Value and
/// history fetches are counted, and the peak number of fetches running at
/// the same time is recorded, as is the order of catalog requests and
/// finished value fetches.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<Vec<Stored>>,
    failing: HashSet<String>,
    latency: Duration,
    now: Option<DateTime<Utc>>,
    value_calls: AtomicUsize,
    history_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter whose history is its single current version.
    pub fn with_parameter(
        self,
        name: impl Into<String>,
        last_modified: DateTime<Utc>,
        value: impl Into<String>,
    ) -> Self {
        let value = value.into();
        let history = vec![HistoryRecord {
            last_modified,
            value: value.clone(),
        }];
        self.with_history(name, last_modified, value, history)
    }

    /// Adds a parameter with an explicit history, oldest first.
    pub fn with_history(
        mut self,
        name: impl Into<String>,
        last_modified: DateTime<Utc>,
        value: impl Into<String>,
        history: Vec<HistoryRecord>,
    ) -> Self {
        self.entries.get_mut().push(Stored {
            name: name.into(),
            last_modified,
            value: value.into(),
            tier: Tier::Standard,
            secret: true,
            history,
        });
        self
    }

    /// Makes every value or history fetch of `name` fail with access denied.
    pub fn failing_on(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Delays every value and history fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fixes the timestamp stamped on writes.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn value_calls(&self) -> usize {
        self.value_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    /// Highest number of value/history fetches observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Catalog requests and finished value fetches, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Current value and tier of `name`, if present.
    pub async fn stored(&self, name: &str) -> Option<(String, Tier, bool)> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.name == name)
            .map(|e| (e.value.clone(), e.tier, e.secret))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn fetch_guard(&self, name: &str) -> Result<FetchGuard<'_>, SsmError> {
        let guard = FetchGuard::enter(&self.in_flight, &self.peak_in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(name) {
            return Err(SsmError::AccessDenied {
                key: name.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(guard)
    }
}

/// Tracks one fetch in flight for the lifetime of the guard.
struct FetchGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> FetchGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn parse_offset(token: Option<&str>, operation: &'static str) -> Result<usize, SsmError> {
    match token {
        None => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| SsmError::transport(operation, format!("invalid next token '{t}'"))),
    }
}

fn page_bounds(offset: usize, page_size: i32, total: usize) -> (usize, Option<String>) {
    let size = usize::try_from(page_size).unwrap_or(0).max(1);
    let end = (offset + size).min(total);
    let next = (end < total).then(|| end.to_string());
    (end, next)
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn describe_catalog(&self, query: CatalogQuery) -> Result<CatalogPage, SsmError> {
        self.record(Call::Describe);
        let offset = parse_offset(query.next_token.as_deref(), "DescribeParameters")?;
        let entries = self.entries.read().await;
        let matching: Vec<&Stored> = entries
            .iter()
            .filter(|e| match &query.name_contains {
                Some(s) => e.name.contains(s.as_str()),
                None => true,
            })
            .collect();

        if offset > matching.len() {
            return Err(SsmError::transport(
                "DescribeParameters",
                format!("next token {offset} is past the end of the catalog"),
            ));
        }
        let (end, next_token) = page_bounds(offset, query.page_size, matching.len());

        Ok(CatalogPage {
            entries: matching[offset..end]
                .iter()
                .map(|e| CatalogEntry {
                    name: e.name.clone(),
                    last_modified: e.last_modified,
                })
                .collect(),
            next_token,
        })
    }

    async fn get_value(&self, name: &str, _decrypt: bool) -> Result<String, SsmError> {
        self.value_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.fetch_guard(name).await?;
        let value = self
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.clone())
            .ok_or_else(|| SsmError::NotFound {
                key: name.to_string(),
            })?;
        self.record(Call::Value(name.to_string()));
        Ok(value)
    }

    async fn get_value_history(&self, query: HistoryQuery) -> Result<HistoryPage, SsmError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.fetch_guard(&query.name).await?;
        let offset = parse_offset(query.next_token.as_deref(), "GetParameterHistory")?;
        let entries = self.entries.read().await;
        let stored = entries
            .iter()
            .find(|e| e.name == query.name)
            .ok_or_else(|| SsmError::NotFound {
                key: query.name.clone(),
            })?;

        if offset > stored.history.len() {
            return Err(SsmError::transport(
                "GetParameterHistory",
                format!("next token {offset} is past the end of the history"),
            ));
        }
        let (end, next_token) = page_bounds(offset, query.page_size, stored.history.len());

        Ok(HistoryPage {
            entries: stored.history[offset..end].to_vec(),
            next_token,
        })
    }

    async fn put_value(&self, request: PutRequest) -> Result<Tier, SsmError> {
        let now = self.now.unwrap_or_else(Utc::now);
        let mut entries = self.entries.write().await;
        let record = HistoryRecord {
            last_modified: now,
            value: request.value.clone(),
        };

        match entries.iter_mut().find(|e| e.name == request.name) {
            Some(_) if !request.overwrite => Err(SsmError::transport(
                "PutParameter",
                format!("parameter '{}' already exists", request.name),
            )),
            Some(existing) => {
                existing.value = request.value;
                existing.last_modified = now;
                if existing.tier != Tier::Advanced {
                    existing.tier = request.tier;
                }
                existing.secret = request.secret;
                existing.history.push(record);
                Ok(existing.tier)
            }
            None => {
                entries.push(Stored {
                    name: request.name,
                    last_modified: now,
                    value: request.value,
                    tier: request.tier,
                    secret: request.secret,
                    history: vec![record],
                });
                Ok(request.tier)
            }
        }
    }

    async fn delete_value(&self, name: &str) -> Result<(), SsmError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.name != name);
        if entries.len() == before {
            return Err(SsmError::NotFound {
                key: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn catalog(n: u32) -> InMemoryDirectory {
        (1..=n).fold(InMemoryDirectory::new(), |dir, i| {
            dir.with_parameter(format!("/p/{i:03}"), ts(1), i.to_string())
        })
    }

    #[tokio::test]
    async fn test_describe_pages_follow_tokens() {
        let dir = catalog(5);
        let first = dir
            .describe_catalog(CatalogQuery {
                name_contains: None,
                page_size: 2,
                next_token: None,
            })
            .await
            .unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let last = dir
            .describe_catalog(CatalogQuery {
                name_contains: None,
                page_size: 2,
                next_token: Some("4".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(last.entries.len(), 1);
        assert!(last.next_token.is_none());
    }

    #[tokio::test]
    async fn test_malformed_token_is_transport_error() {
        let dir = catalog(1);
        let err = dir
            .describe_catalog(CatalogQuery {
                name_contains: None,
                page_size: 50,
                next_token: Some("garbage".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SsmError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_put_appends_history_and_delete_missing_fails() {
        let dir = InMemoryDirectory::new().with_clock(ts(3));
        dir.put_value(PutRequest {
            name: "/k".to_string(),
            value: "v1".to_string(),
            overwrite: true,
            secret: true,
            tier: Tier::Standard,
        })
        .await
        .unwrap();
        dir.put_value(PutRequest {
            name: "/k".to_string(),
            value: "v2".to_string(),
            overwrite: true,
            secret: true,
            tier: Tier::Standard,
        })
        .await
        .unwrap();

        let page = dir
            .get_value_history(HistoryQuery {
                name: "/k".to_string(),
                decrypt: true,
                page_size: 50,
                next_token: None,
            })
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 2);

        dir.delete_value("/k").await.unwrap();
        assert!(matches!(
            dir.delete_value("/k").await,
            Err(SsmError::NotFound { .. })
        ));
    }
}
