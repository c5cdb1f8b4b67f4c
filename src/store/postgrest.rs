use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::RemoteStore;
use super::types::{compact_columns, AccessToken, Match, Table};
use crate::config::Config;
use crate::error::StoreError;

/// PostgREST client for the hosted data API
pub struct SupabaseStore {
    client: Client,
    config: Config,
    access_token: AccessToken,
}

impl SupabaseStore {
    pub fn new(config: Config, access_token: AccessToken) -> anyhow::Result<Self> {
        let client = build_client(&config)?;
        Ok(Self {
            client,
            config,
            access_token,
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .get()
            .unwrap_or_else(|| self.config.api_key.clone());

        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }
}

/// HTTP client shared by the data and auth clients
pub fn build_client(config: &Config) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("homelands/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Turn a non-success response into `StoreError::Api`
pub async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    warn!("Backend returned status: {}", status);
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::from_body(status.as_u16(), &body))
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn select(&self, table: Table, columns: &str) -> Result<Vec<Value>, StoreError> {
        let url = self.config.rest_url(table.as_str());
        let select = compact_columns(columns);
        debug!("GET {} select={}", url, select);

        let response = self
            .request(self.client.get(&url))
            .query(&[("select", select.as_str())])
            .send()
            .await?;

        let rows: Vec<Value> = check(response).await?.json().await?;
        debug!("Fetched {} rows from {}", rows.len(), table.as_str());
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<(), StoreError> {
        let url = self.config.rest_url(table.as_str());
        debug!("POST {} ({} rows)", url, rows.len());

        let response = self
            .request(self.client.post(&url))
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn update(&self, table: Table, patch: Value, filter: &Match) -> Result<(), StoreError> {
        filter.require_filter("UPDATE")?;
        let url = self.config.rest_url(table.as_str());
        debug!("PATCH {} {:?}", url, filter.to_query());

        let response = self
            .request(self.client.patch(&url))
            .header("Prefer", "return=minimal")
            .query(&filter.to_query())
            .json(&patch)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, filter: &Match) -> Result<(), StoreError> {
        filter.require_filter("DELETE")?;
        let url = self.config.rest_url(table.as_str());
        debug!("DELETE {} {:?}", url, filter.to_query());

        let response = self
            .request(self.client.delete(&url))
            .query(&filter.to_query())
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Supabase"
    }
}
