//! External source client (ODS Explore API v2.1).

use crate::catalog::handle_error_response;
use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use orgsync_core::{ExternalRecord, RecordPage};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest page the Explore API serves.
pub const MAX_PAGE_SIZE: usize = 100;

/// Upper bound on records fetched in one run.
pub const MAX_SOURCE_RECORDS: usize = 50_000;

/// Fields requested for organisation records.
const RECORD_FIELDS: &str = "id,title,title_full,url_website,children_id";

/// Paged access to the authoritative record set.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch_records(&self, page_size: usize, offset: usize) -> ClientResult<RecordPage>;
}

/// reqwest-based [`SourceClient`] for one ODS dataset.
#[derive(Debug, Clone)]
pub struct OdsClient {
    base_url: String,
    dataset_id: String,
    http_client: Client,
    retry: RetryPolicy,
}

impl OdsClient {
    pub fn new(
        base_url: impl Into<String>,
        dataset_id: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> ClientResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orgsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, dataset_id, retry, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(
        base_url: impl Into<String>,
        dataset_id: impl Into<String>,
        retry: RetryPolicy,
        http_client: Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dataset_id: dataset_id.into(),
            http_client,
            retry,
        }
    }

    fn records_url(&self) -> ClientResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidConfig("base url cannot have a path".into()))?
            .pop_if_empty()
            .extend([
                "api",
                "explore",
                "v2.1",
                "catalog",
                "datasets",
                self.dataset_id.as_str(),
                "records",
            ]);
        Ok(url)
    }

    async fn get_page(&self, url: &Url, limit: usize, offset: usize) -> ClientResult<RecordPage> {
        debug!("ODS GET {} (limit={}, offset={})", url, limit, offset);
        let response = self
            .http_client
            .get(url.clone())
            .query(&[
                ("select", RECORD_FIELDS.to_string()),
                ("order_by", "id".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return handle_error_response(response).await;
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Parse(format!("failed to parse records page: {e}")))
    }
}

#[async_trait]
impl SourceClient for OdsClient {
    async fn fetch_records(&self, page_size: usize, offset: usize) -> ClientResult<RecordPage> {
        let url = self.records_url()?;
        let url = &url;
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        self.retry
            .execute("fetch_records", move || async move {
                self.get_page(url, limit, offset).await
            })
            .await
    }
}

/// Fetch every record, page by page, until an empty page or the reported
/// total is reached.
pub async fn fetch_all_records<S: SourceClient + ?Sized>(
    source: &S,
    page_size: usize,
) -> ClientResult<Vec<ExternalRecord>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut records: Vec<ExternalRecord> = Vec::new();
    let mut offset = 0;

    loop {
        let page = source.fetch_records(page_size, offset).await?;
        if page.results.is_empty() {
            break;
        }
        offset += page.results.len();
        records.extend(page.results);
        debug!(fetched = records.len(), total = page.total_count, "Fetched record page");

        if page.total_count > 0 && records.len() as u64 >= page.total_count {
            break;
        }
        if records.len() >= MAX_SOURCE_RECORDS {
            warn!(
                limit = MAX_SOURCE_RECORDS,
                "Source record limit reached, remaining records are ignored"
            );
            records.truncate(MAX_SOURCE_RECORDS);
            break;
        }
    }

    info!(records = records.len(), "Fetched source records");
    Ok(records)
}
