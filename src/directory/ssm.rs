use async_trait::async_trait;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::primitives::DateTime as AwsDateTime;
use aws_sdk_ssm::types::{ParameterHistory, ParameterStringFilter, ParameterTier, ParameterType};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{
    CatalogEntry, CatalogPage, CatalogQuery, DirectoryService, HistoryPage, HistoryQuery,
    HistoryRecord, PutRequest, Tier,
};
use crate::error::SsmError;

/// [`DirectoryService`] backed by AWS SSM Parameter Store.
///
/// Values are read with decryption when asked to, so `SecureString`
/// parameters need the matching KMS permissions as well as `ssm:GetParameter`.
#[derive(Clone)]
pub struct SsmDirectory {
    client: aws_sdk_ssm::Client,
}

impl SsmDirectory {
    /// Creates a directory from an already loaded AWS configuration.
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }

    pub fn from_client(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DirectoryService for SsmDirectory {
    async fn describe_catalog(&self, query: CatalogQuery) -> Result<CatalogPage, SsmError> {
        let filters = match query.name_contains.as_deref() {
            Some(substring) => Some(vec![name_contains_filter(substring)?]),
            None => None,
        };

        let resp = self
            .client
            .describe_parameters()
            .set_parameter_filters(filters)
            .max_results(query.page_size)
            .set_next_token(query.next_token)
            .send()
            .await
            .map_err(|e| classify("DescribeParameters", "", e))?;

        let mut entries = Vec::with_capacity(resp.parameters().len());
        for meta in resp.parameters() {
            match (meta.name(), to_utc(meta.last_modified_date())) {
                (Some(name), Some(last_modified)) => entries.push(CatalogEntry {
                    name: name.to_string(),
                    last_modified,
                }),
                (name, _) => warn!(?name, "Skipping catalog entry without name or timestamp"),
            }
        }

        debug!(
            count = entries.len(),
            more = resp.next_token().is_some(),
            "Catalog page received"
        );

        Ok(CatalogPage {
            entries,
            next_token: resp.next_token().map(str::to_string),
        })
    }

    async fn get_value(&self, name: &str, decrypt: bool) -> Result<String, SsmError> {
        let resp = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(decrypt)
            .send()
            .await
            .map_err(|e| classify("GetParameter", name, e))?;

        resp.parameter
            .and_then(|p| p.value)
            .ok_or_else(|| SsmError::NotFound {
                key: name.to_string(),
            })
    }

    async fn get_value_history(&self, query: HistoryQuery) -> Result<HistoryPage, SsmError> {
        let resp = self
            .client
            .get_parameter_history()
            .name(&query.name)
            .with_decryption(query.decrypt)
            .max_results(query.page_size)
            .set_next_token(query.next_token)
            .send()
            .await
            .map_err(|e| classify("GetParameterHistory", &query.name, e))?;

        Ok(HistoryPage {
            entries: history_records(resp.parameters()),
            next_token: resp.next_token().map(str::to_string),
        })
    }

    async fn put_value(&self, request: PutRequest) -> Result<Tier, SsmError> {
        let kind = if request.secret {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };
        let tier = match request.tier {
            Tier::Standard => ParameterTier::Standard,
            Tier::Advanced => ParameterTier::Advanced,
        };

        let resp = self
            .client
            .put_parameter()
            .name(&request.name)
            .value(request.value)
            .overwrite(request.overwrite)
            .r#type(kind)
            .tier(tier)
            .send()
            .await
            .map_err(|e| classify("PutParameter", &request.name, e))?;

        // The service never moves an advanced parameter back to standard.
        Ok(match resp.tier() {
            Some(ParameterTier::Advanced) => Tier::Advanced,
            Some(ParameterTier::Standard) => Tier::Standard,
            _ => request.tier,
        })
    }

    async fn delete_value(&self, name: &str) -> Result<(), SsmError> {
        self.client
            .delete_parameter()
            .name(name)
            .send()
            .await
            .map_err(|e| classify("DeleteParameter", name, e))?;
        Ok(())
    }
}

fn name_contains_filter(substring: &str) -> Result<ParameterStringFilter, SsmError> {
    ParameterStringFilter::builder()
        .key("Name")
        .option("Contains")
        .values(substring)
        .build()
        .map_err(|e| SsmError::Validation(e.to_string()))
}

fn history_records(versions: &[ParameterHistory]) -> Vec<HistoryRecord> {
    let mut records = Vec::with_capacity(versions.len());
    for version in versions {
        match to_utc(version.last_modified_date()) {
            Some(last_modified) => records.push(HistoryRecord {
                last_modified,
                value: version.value().unwrap_or_default().to_string(),
            }),
            None => warn!(
                name = ?version.name(),
                version = version.version(),
                "Skipping history record without timestamp"
            ),
        }
    }
    records
}

fn to_utc(ts: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

/// Maps an SDK failure onto the crate's error taxonomy.
fn classify<E, R>(operation: &'static str, key: &str, err: SdkError<E, R>) -> SsmError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    match code.as_deref() {
        Some("ParameterNotFound") => SsmError::NotFound {
            key: key.to_string(),
        },
        Some("AccessDeniedException") => SsmError::AccessDenied {
            key: key.to_string(),
            message,
        },
        _ => SsmError::transport(operation, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_record_without_timestamp_is_skipped() {
        let versions = vec![
            ParameterHistory::builder()
                .name("/k")
                .version(1)
                .value("old")
                .last_modified_date(AwsDateTime::from_secs(1_704_067_200))
                .build(),
            ParameterHistory::builder()
                .name("/k")
                .version(2)
                .value("lost")
                .build(),
            ParameterHistory::builder()
                .name("/k")
                .version(3)
                .last_modified_date(AwsDateTime::from_secs(1_704_153_600))
                .build(),
        ];

        let records = history_records(&versions);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, "old");
        assert_eq!(records[0].last_modified.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(records[1].value, "");
    }
}
