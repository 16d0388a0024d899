//! Dataspot catalog client.
//!
//! Provides the [`CatalogClient`] seam used by the reconciliation engine and
//! a reqwest implementation against the Dataspot REST and bulk APIs.

use crate::auth::CatalogAuth;
use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;
use crate::wire::{CatalogEntity, EntityPayload, EntityRef, UpdateMode, UploadMessage, UploadMode};
use async_trait::async_trait;
use orgsync_core::business_key;
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Operations the reconciliation engine needs from the catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch one entity. A missing entity is `Ok(None)`.
    async fn get_entity(&self, entity: &EntityRef) -> ClientResult<Option<CatalogEntity>>;

    /// Create an entity below `parent`, or at the scheme root.
    async fn create(
        &self,
        parent: Option<&EntityRef>,
        payload: &EntityPayload,
    ) -> ClientResult<CatalogEntity>;

    async fn update(
        &self,
        entity: &EntityRef,
        payload: &EntityPayload,
        mode: UpdateMode,
    ) -> ClientResult<CatalogEntity>;

    async fn delete(&self, entity: &EntityRef) -> ClientResult<()>;

    /// Upload many entities at once. Each rejected entity yields an
    /// `ERROR` message; the call itself only fails on transport errors.
    async fn bulk_upload(
        &self,
        scheme: &str,
        payloads: &[EntityPayload],
        mode: UploadMode,
        dry_run: bool,
    ) -> ClientResult<Vec<UploadMessage>>;

    /// Every entity of a scheme.
    async fn download_all(&self, scheme: &str) -> ClientResult<Vec<CatalogEntity>>;
}

/// Connection settings for [`DataspotClient`].
#[derive(Debug, Clone)]
pub struct DataspotConfig {
    pub base_url: String,
    pub database: String,
    /// Scheme used to resolve business-key paths.
    pub scheme: String,
    pub timeout: Duration,
}

/// reqwest-based [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct DataspotClient {
    base_url: String,
    database: String,
    scheme: String,
    auth: CatalogAuth,
    http_client: Client,
    retry: RetryPolicy,
}

impl DataspotClient {
    pub fn new(config: DataspotConfig, auth: CatalogAuth, retry: RetryPolicy) -> ClientResult<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("orgsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(config, auth, retry, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(
        config: DataspotConfig,
        auth: CatalogAuth,
        retry: RetryPolicy,
        http_client: Client,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            database: config.database,
            scheme: config.scheme,
            auth,
            http_client,
            retry,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── URL construction ──────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidConfig("base url cannot have a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn scheme_url(&self, scheme: &str, tail: &str) -> ClientResult<Url> {
        self.url(&["api", &self.database, "schemes", scheme, tail])
    }

    /// REST URL addressing an entity by id or by business-key path.
    fn entity_url(&self, entity: &EntityRef) -> ClientResult<Url> {
        match entity {
            EntityRef::Id(id) => {
                let id = id.to_string();
                self.url(&["rest", &self.database, "collections", &id])
            }
            EntityRef::Path(path) => {
                let labels = business_key::split_path(path)
                    .map_err(|e| ClientError::InvalidPath(e.to_string()))?;
                let mut segments = vec!["rest", self.database.as_str(), "schemes", self.scheme.as_str()];
                for label in &labels {
                    segments.push("collections");
                    segments.push(label.as_str());
                }
                self.url(&segments)
            }
        }
    }

    // ── Internal HTTP Methods ─────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: &Url) -> ClientResult<T> {
        debug!("Dataspot GET {}", url);
        let builder = self.auth.apply(self.http_client.get(url.clone()));
        let response = builder.send().await?;
        self.handle_response(response).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: &Url,
        body: &B,
    ) -> ClientResult<T> {
        debug!("Dataspot {} {}", method, url);
        let builder = self.auth.apply(self.http_client.request(method, url.clone()));
        let response = builder.json(body).send().await?;
        self.handle_response(response).await
    }

    async fn delete_url(&self, url: &Url) -> ClientResult<()> {
        debug!("Dataspot DELETE {}", url);
        let builder = self.auth.apply(self.http_client.delete(url.clone()));
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            if status == StatusCode::NOT_FOUND {
                debug!("Entity at {} already gone", url);
            }
            Ok(())
        } else {
            handle_error_response(response).await
        }
    }

    // ── Response Handling ─────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ClientResult<T> {
        if !response.status().is_success() {
            return handle_error_response(response).await;
        }
        let body = response.text().await?;
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body)
            .map_err(|e| ClientError::Parse(format!("failed to parse catalog response: {e}")))
    }
}

pub(crate) async fn handle_error_response<T>(response: reqwest::Response) -> ClientResult<T> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());

    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(body)),
        StatusCode::CONFLICT => Err(ClientError::Conflict(body)),
        StatusCode::TOO_MANY_REQUESTS => {
            warn!("Rate limited, retry after {:?}s", retry_after);
            Err(ClientError::RateLimited {
                retry_after_secs: retry_after,
            })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::AuthError(format!(
            "HTTP {}: {body}",
            status.as_u16()
        ))),
        _ => {
            let detail = if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            };
            Err(ClientError::Api {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

#[async_trait]
impl CatalogClient for DataspotClient {
    async fn get_entity(&self, entity: &EntityRef) -> ClientResult<Option<CatalogEntity>> {
        let url = self.entity_url(entity)?;
        let url = &url;
        let result = self
            .retry
            .execute("get_entity", move || async move { self.get::<CatalogEntity>(url).await })
            .await;
        match result {
            Ok(found) => Ok(Some(found)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        parent: Option<&EntityRef>,
        payload: &EntityPayload,
    ) -> ClientResult<CatalogEntity> {
        let mut url = match parent {
            Some(parent) => self.entity_url(parent)?,
            None => self.url(&["rest", &self.database, "schemes", &self.scheme])?,
        };
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidConfig("base url cannot have a path".into()))?
            .push("collections");
        let url = &url;
        self.retry
            .execute("create", move || async move {
                self.send_json(reqwest::Method::POST, url, payload).await
            })
            .await
    }

    async fn update(
        &self,
        entity: &EntityRef,
        payload: &EntityPayload,
        mode: UpdateMode,
    ) -> ClientResult<CatalogEntity> {
        let url = self.entity_url(entity)?;
        let url = &url;
        let method = match mode {
            UpdateMode::Partial => reqwest::Method::PATCH,
            UpdateMode::Replace => reqwest::Method::PUT,
        };
        let method = &method;
        self.retry
            .execute("update", move || async move {
                self.send_json(method.clone(), url, payload).await
            })
            .await
    }

    async fn delete(&self, entity: &EntityRef) -> ClientResult<()> {
        let url = self.entity_url(entity)?;
        let url = &url;
        self.retry
            .execute("delete", move || async move { self.delete_url(url).await })
            .await
    }

    async fn bulk_upload(
        &self,
        scheme: &str,
        payloads: &[EntityPayload],
        mode: UploadMode,
        dry_run: bool,
    ) -> ClientResult<Vec<UploadMessage>> {
        let mut url = self.scheme_url(scheme, "upload")?;
        url.query_pairs_mut()
            .append_pair("operation", mode.as_str())
            .append_pair("dryRun", if dry_run { "true" } else { "false" });
        info!(scheme, entities = payloads.len(), mode = %mode, dry_run, "Uploading entities");

        let url = &url;
        let messages: Option<Vec<UploadMessage>> = self
            .retry
            .execute("bulk_upload", move || async move {
                self.send_json(reqwest::Method::POST, url, payloads).await
            })
            .await?;
        Ok(messages.unwrap_or_default())
    }

    async fn download_all(&self, scheme: &str) -> ClientResult<Vec<CatalogEntity>> {
        let mut url = self.scheme_url(scheme, "download")?;
        url.query_pairs_mut().append_pair("format", "JSON");
        let url = &url;
        let entities: Option<Vec<CatalogEntity>> = self
            .retry
            .execute("download_all", move || async move { self.get(url).await })
            .await?;
        let entities = entities.unwrap_or_default();
        info!(scheme, entities = entities.len(), "Downloaded catalog snapshot");
        Ok(entities)
    }
}
