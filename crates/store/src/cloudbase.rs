//! China-region driver: HTTP document database API.
//!
//! Collections live under
//! `{endpoint}/v1/envs/{env_id}/collections/{collection}/documents`.
//! Every request carries the API key as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use twinchat_common::config::CnBackendConfig;
use twinchat_common::{AppError, AppResult, Region};
use url::Url;

use crate::document::{Direction, Document, DocumentStore, Query, document_id};

/// Document API client.
#[derive(Clone)]
pub struct CloudbaseStore {
    client: Client,
    base: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct DeleteEnvelope {
    deleted: u64,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl CloudbaseStore {
    /// Build a client from configuration.
    pub fn new(config: &CnBackendConfig) -> AppResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::Config("cn backend api_key is empty".to_string()));
        }

        let mut base = Url::parse(&config.endpoint)
            .map_err(|e| AppError::Config(format!("invalid cn endpoint: {e}")))?;
        base.path_segments_mut()
            .map_err(|()| AppError::Config("cn endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["v1", "envs", config.env_id.as_str(), "collections"]);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
        })
    }

    /// URL of a collection's documents, optionally of one document.
    pub(crate) fn documents_url(&self, collection: &str, id: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend([collection, "documents"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> AppResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn read_document(response: Response) -> AppResult<Document> {
        let envelope: DataEnvelope<Document> = response
            .json()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(envelope.data)
    }

    /// Turn a non-success response into a storage (or conflict) error.
    async fn error_from(response: Response) -> AppError {
        let status = response.status();
        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        let message = format!("{status} {}: {}", body.code, body.message);
        if status == StatusCode::CONFLICT {
            AppError::Conflict(message)
        } else {
            AppError::Storage(message)
        }
    }

    async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> AppResult<Option<Document>> {
        let url = self.documents_url(collection, Some(id));
        let response = self
            .send(self.request(Method::PATCH, url).json(&json!({ "data": body })))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::read_document(response).await.map(Some),
            _ => Err(Self::error_from(response).await),
        }
    }
}

/// Request body for a query.
pub(crate) fn query_body(query: &Query) -> Value {
    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|f| json!({"field": f.field, "op": f.op.wire_name(), "value": f.value}))
        .collect();

    let mut body = json!({ "where": filters });
    if let Some(order) = &query.order {
        body["orderBy"] = json!({
            "field": order.field,
            "direction": match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            },
        });
    }
    if let Some(limit) = query.limit {
        body["limit"] = json!(limit);
    }
    body
}

#[async_trait]
impl DocumentStore for CloudbaseStore {
    fn region(&self) -> Region {
        Region::Cn
    }

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let url = self.documents_url(collection, Some(id));
        let response = self.send(self.request(Method::GET, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::read_document(response).await.map(Some),
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>> {
        let mut url = self.documents_url(collection, None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("query");
        }
        debug!(collection, filters = query.filters.len(), "Querying cn documents");

        let response = self
            .send(self.request(Method::POST, url).json(&query_body(query)))
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let envelope: DataEnvelope<Vec<Document>> = response
            .json()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(envelope.data)
    }

    async fn insert(&self, collection: &str, doc: Document) -> AppResult<Document> {
        document_id(&doc)?;
        let url = self.documents_url(collection, None);
        let response = self
            .send(self.request(Method::POST, url).json(&json!({ "data": doc })))
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Self::read_document(response).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut patch: Document,
    ) -> AppResult<Option<Document>> {
        patch.remove("id");
        self.patch_document(collection, id, json!({ "$set": patch }))
            .await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> AppResult<Option<Document>> {
        self.patch_document(collection, id, json!({ "$inc": { field: delta } }))
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let url = self.documents_url(collection, Some(id));
        let response = self.send(self.request(Method::DELETE, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => {
                let envelope: DeleteEnvelope = response
                    .json()
                    .await
                    .map_err(|e| AppError::Storage(e.to_string()))?;
                Ok(envelope.deleted > 0)
            }
            _ => Err(Self::error_from(response).await),
        }
    }
}
