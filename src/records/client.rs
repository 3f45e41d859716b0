//! HTTP client for the hosted record-storage API.
//!
//! Uses reqwest with Bearer token auth. Every table lives under
//! `{base}/projects/{project}/tables/{table}/records`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use super::{Query, ReadResponse, Record, RecordStore, WriteResponse};
use crate::error::CrmError;
use crate::types::{Config, RecordId};

pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: Url,
    project_id: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl HttpRecordStore {
    pub fn new(config: &Config) -> Result<Self, CrmError> {
        let mut base_url = Url::parse(&config.api_base_url).map_err(|e| {
            CrmError::Configuration(format!("Invalid apiBaseUrl {:?}: {}", config.api_base_url, e))
        })?;
        // Url::join drops the last path segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CrmError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn records_url(&self, table: &str, suffix: &str) -> Result<Url, CrmError> {
        let path = format!(
            "projects/{}/tables/{}/records{}",
            self.project_id, table, suffix
        );
        self.base_url
            .join(&path)
            .map_err(|e| CrmError::Configuration(format!("Invalid record URL {}: {}", path, e)))
    }

    fn transport_error(&self, err: reqwest::Error) -> CrmError {
        if err.is_timeout() {
            CrmError::Timeout(self.timeout_secs)
        } else {
            CrmError::Network(err.to_string())
        }
    }

    /// Send one request. `Ok(None)` means the store answered 404.
    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<Option<T>, CrmError> {
        log::debug!("record store {} {}", method, url.path());

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            log::warn!("record store {} {} answered {}", method, url.path(), status);
            return Err(CrmError::Remote(format!("HTTP {}: {}", status, text)));
        }

        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CrmError::Decode(format!("Failed to parse record store response: {}", e)))
    }

    async fn write(
        &self,
        method: Method,
        table: &str,
        body: Value,
    ) -> Result<WriteResponse, CrmError> {
        let url = self.records_url(table, "")?;
        let resp: Option<WriteResponse> = self.send(method, url, &body).await?;
        Ok(resp.unwrap_or_else(|| WriteResponse {
            success: false,
            message: Some(format!("Table {} not found", table)),
            results: Vec::new(),
        }))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn fetch_records(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<ReadResponse<Vec<Value>>, CrmError> {
        let url = self.records_url(table, "/query")?;
        let resp: Option<ReadResponse<Vec<Value>>> = self.send(Method::POST, url, query).await?;
        Ok(resp.unwrap_or_else(|| ReadResponse::failed(format!("Table {} not found", table))))
    }

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        query: &Query,
    ) -> Result<ReadResponse<Value>, CrmError> {
        let url = self.records_url(table, &format!("/{}/query", id))?;
        let resp: Option<ReadResponse<Value>> = self.send(Method::POST, url, query).await?;
        Ok(resp.unwrap_or_else(|| ReadResponse::failed(format!("Record {} does not exist", id))))
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<WriteResponse, CrmError> {
        self.write(Method::POST, table, json!({ "records": records }))
            .await
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<Record>,
    ) -> Result<WriteResponse, CrmError> {
        self.write(Method::PATCH, table, json!({ "records": records }))
            .await
    }

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<WriteResponse, CrmError> {
        self.write(Method::DELETE, table, json!({ "RecordIds": ids }))
            .await
    }
}
