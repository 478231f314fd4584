//! Single-parameter operations: one round-trip each, no state kept between
//! calls.

use tracing::{debug, info};

use crate::directory::{DirectoryService, PutRequest, Tier};
use crate::error::SsmError;

/// Largest value, in UTF-8 bytes, stored in the standard tier.
pub const STANDARD_TIER_MAX_BYTES: usize = 4096;

/// Picks the cheapest tier that can hold `value`.
pub fn select_tier(value: &str) -> Tier {
    if value.len() > STANDARD_TIER_MAX_BYTES {
        Tier::Advanced
    } else {
        Tier::Standard
    }
}

/// Returns the decrypted value of `key`.
#[tracing::instrument(skip(directory))]
pub async fn get<D>(directory: &D, key: &str) -> Result<String, SsmError>
where
    D: DirectoryService + ?Sized,
{
    let value = directory.get_value(key, true).await?;
    debug!(bytes = value.len(), "Parameter read");
    Ok(value)
}

/// Writes `value` to `key` as a secret, overwriting any existing value.
///
/// Returns the tier the value is stored in. A parameter already in the
/// advanced tier stays there even when the new value would fit in standard.
#[tracing::instrument(skip(directory, value))]
pub async fn set<D>(directory: &D, key: &str, value: &str) -> Result<Tier, SsmError>
where
    D: DirectoryService + ?Sized,
{
    let requested = select_tier(value);
    let tier = directory
        .put_value(PutRequest {
            name: key.to_string(),
            value: value.to_string(),
            overwrite: true,
            secret: true,
            tier: requested,
        })
        .await?;
    if tier != requested {
        debug!(?requested, ?tier, "Parameter kept its existing tier");
    }
    info!(?tier, "Parameter written");
    Ok(tier)
}

/// Deletes `key`. Deleting a missing key is an error.
#[tracing::instrument(skip(directory))]
pub async fn delete<D>(directory: &D, key: &str) -> Result<(), SsmError>
where
    D: DirectoryService + ?Sized,
{
    directory.delete_value(key).await?;
    info!("Parameter deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_tier_boundary() {
        assert_eq!(select_tier(&"x".repeat(4096)), Tier::Standard);
        assert_eq!(select_tier(&"x".repeat(4097)), Tier::Advanced);
        assert_eq!(select_tier(""), Tier::Standard);
    }

    #[test]
    fn test_tier_counts_bytes_not_chars() {
        // 'é' is two bytes in UTF-8.
        assert_eq!(select_tier(&"é".repeat(2048)), Tier::Standard);
        assert_eq!(select_tier(&format!("{}x", "é".repeat(2048))), Tier::Advanced);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = InMemoryDirectory::new();
        let tier = set(&dir, "/app/prod/version", "27").await.unwrap();
        assert_eq!(tier, Tier::Standard);
        assert_eq!(get(&dir, "/app/prod/version").await.unwrap(), "27");
    }

    #[tokio::test]
    async fn test_set_overwrites_and_stores_secret() {
        let dir = InMemoryDirectory::new().with_parameter(
            "/k",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            "old",
        );
        let big = "v".repeat(5000);
        assert_eq!(set(&dir, "/k", &big).await.unwrap(), Tier::Advanced);

        let (value, tier, secret) = dir.stored("/k").await.unwrap();
        assert_eq!(value, big);
        assert_eq!(tier, Tier::Advanced);
        assert!(secret);
    }

    #[tokio::test]
    async fn test_small_value_keeps_advanced_tier() {
        let dir = InMemoryDirectory::new();
        assert_eq!(set(&dir, "/k", &"v".repeat(5000)).await.unwrap(), Tier::Advanced);
        assert_eq!(set(&dir, "/k", "small").await.unwrap(), Tier::Advanced);

        let (value, tier, _) = dir.stored("/k").await.unwrap();
        assert_eq!(value, "small");
        assert_eq!(tier, Tier::Advanced);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = InMemoryDirectory::new();
        let err = get(&dir, "/nope").await.unwrap_err();
        assert!(matches!(err, SsmError::NotFound { ref key } if key == "/nope"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_an_error() {
        let dir = InMemoryDirectory::new();
        set(&dir, "/k", "v").await.unwrap();
        delete(&dir, "/k").await.unwrap();
        assert!(dir.is_empty().await);
        assert!(matches!(
            delete(&dir, "/k").await,
            Err(SsmError::NotFound { .. })
        ));
    }
}
