//! # Row API
//!
//! Read side of the hosted database. Every page issues at most one call
//! through here, so the client stays deliberately plain:
//!
//! - one round trip per call, no retries, no caching
//! - no timeout beyond whatever the transport enforces
//! - `apikey` header always carries the project key
//! - `Authorization` carries the caller's access token so row-level policies apply,
//!   or the project key again for anonymous reads
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{
    error::StoreError,
    query::{QueryRequest, QueryResult, Row},
};

const REST_PATH: &str = "rest/v1/";

/// Postgres `invalid_text_representation`, e.g. `id = eq.abc` on an integer column
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Runs one read. `bearer` is the caller's access token, if any.
    async fn fetch(
        &self,
        request: &QueryRequest,
        bearer: Option<&str>,
    ) -> Result<QueryResult, StoreError>;

    async fn fetch_all(
        &self,
        request: &QueryRequest,
        bearer: Option<&str>,
    ) -> Result<Vec<Row>, StoreError> {
        self.fetch(request, bearer).await.map(QueryResult::into_rows)
    }

    async fn fetch_one(
        &self,
        request: &QueryRequest,
        bearer: Option<&str>,
    ) -> Result<Option<Row>, StoreError> {
        self.fetch(request, bearer).await.map(QueryResult::into_single)
    }
}

pub struct RestRowStore {
    client: Client,
    base: Url,
    api_key: String,
}

impl RestRowStore {
    pub fn new(client: Client, project_url: &Url, api_key: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base: project_url.join(REST_PATH)?,
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.base
            .join(table)
            .map_err(|_| StoreError::InvalidIdentifier(table.to_string()))
    }
}

#[async_trait]
impl RowStore for RestRowStore {
    async fn fetch(
        &self,
        request: &QueryRequest,
        bearer: Option<&str>,
    ) -> Result<QueryResult, StoreError> {
        request.validate()?;

        let url = self.table_url(request.table())?;
        debug!("Row store read: {request}");

        let response = self
            .client
            .get(url)
            .query(&request.to_params())
            .header("apikey", &self.api_key)
            .bearer_auth(bearer.unwrap_or(&self.api_key))
            .send()
            .await
            .map_err(StoreError::Unreachable)?;

        let status = response.status();

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(StoreError::PermissionDenied {
                table: request.table().to_string(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();

            // a key the column cannot even hold matches no row
            if request.is_single() && is_invalid_input(status, &message) {
                debug!("Unparseable key for {request}, treating as absent");
                return Ok(QueryResult::Single(None));
            }

            return Err(StoreError::Service { status, message });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        QueryResult::from_rows(request, into_rows(body)?)
    }
}

fn is_invalid_input(status: StatusCode, body: &str) -> bool {
    status == StatusCode::BAD_REQUEST
        && serde_json::from_str::<Value>(body)
            .is_ok_and(|error| error["code"] == INVALID_TEXT_REPRESENTATION)
}

fn into_rows(body: Value) -> Result<Vec<Row>, StoreError> {
    let Value::Array(items) = body else {
        return Err(StoreError::Decode("expected a JSON array".to_string()));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(StoreError::Decode(format!("expected an object, got {other}"))),
        })
        .collect()
}
