//! Spreadsheet-database (Airtable) record store
//!
//! Single attempt per call with a bounded timeout. List calls follow the
//! `offset` cursor until the result set is exhausted or `max_pages` pages
//! have been read.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::store::{Formula, Record, RecordStore, StoreError};

/// Airtable store configuration
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_url: String,
    pub base_id: String,
    pub timeout: Duration,
    /// Upper bound on `offset` pages fetched by one list call
    pub max_pages: usize,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.airtable.com/v0".to_string(),
            base_id: String::new(),
            timeout: Duration::from_secs(10),
            max_pages: 20,
        }
    }
}

/// HTTP implementation of [`RecordStore`]
pub struct AirtableStore {
    config: AirtableConfig,
    client: Client,
}

impl AirtableStore {
    pub fn new(config: AirtableConfig) -> Result<Self, StoreError> {
        if config.api_key.is_empty() {
            return Err(StoreError::NotConfigured(
                "Airtable API key is required".to_string(),
            ));
        }
        if config.base_id.is_empty() {
            return Err(StoreError::NotConfigured(
                "Airtable base id is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// `{base_url}/{base_id}/{table}[/{record_id}]` with each segment encoded
    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| StoreError::NotConfigured(format!("invalid base url: {e}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::NotConfigured("base url cannot carry a path".to_string())
            })?;
            segments.pop_if_empty().push(&self.config.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn map_send_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.config.timeout)
        } else {
            StoreError::Network(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn find_by_formula(
        &self,
        table: &str,
        formula: &Formula,
    ) -> Result<Vec<Record>, StoreError> {
        let url = self.table_url(table, None)?;
        let expression = formula.render();
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0;

        loop {
            if pages == self.config.max_pages {
                warn!(table = %table, max_pages = pages, "Record store kept paging; giving up");
                return Err(StoreError::TooManyPages(pages));
            }
            pages += 1;
            debug!(table = %table, formula = %expression, page = pages, "Querying record store");

            let mut request = self
                .client
                .get(url.clone())
                .bearer_auth(&self.config.api_key)
                .query(&[("filterByFormula", expression.as_str())]);
            if let Some(cursor) = &offset {
                request = request.query(&[("offset", cursor.as_str())]);
            }

            let response = request.send().await.map_err(|e| self.map_send_error(e))?;
            let page: ListResponse = Self::check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

            records.extend(page.records.into_iter().map(Record::from));

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        Ok(records)
    }

    async fn create(&self, table: &str, fields: Map<String, Value>) -> Result<String, StoreError> {
        let url = self.table_url(table, None)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&FieldsBody { fields })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let created: RecordBody = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(created.id)
    }

    async fn update(
        &self,
        table: &str,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let url = self.table_url(table, Some(record_id))?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.config.api_key)
            .json(&FieldsBody { fields })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        Self::check_status(response).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct FieldsBody {
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<RecordBody>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordBody {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl From<RecordBody> for Record {
    fn from(body: RecordBody) -> Self {
        Record {
            id: body.id,
            fields: body.fields,
        }
    }
}
