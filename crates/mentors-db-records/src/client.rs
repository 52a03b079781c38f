//! Thin HTTP client for the record-store REST API.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use url::{ParseError, Url};

use crate::config::RecordsConfig;
use crate::error::{RecordsError, Result};

/// A record as returned by the API: record ID plus a loose field map.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<RawRecord>,
    #[serde(default)]
    offset: Option<String>,
}

/// Client for list/get/patch calls against one record-store base.
#[derive(Debug, Clone)]
pub struct RecordsClient {
    http: reqwest::Client,
    base: Url,
    config: RecordsConfig,
}

impl RecordsClient {
    /// Creates a client; fails if the base URL is unusable.
    pub fn new(config: RecordsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(RecordsError::Url(ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(Self { http, base, config })
    }

    pub fn config(&self) -> &RecordsConfig {
        &self.config
    }

    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| RecordsError::Url(ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments
                .pop_if_empty()
                .push("v0")
                .push(&self.config.base_id)
                .push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Lists records of a table, following pagination offsets.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        table: &str,
        formula: Option<&str>,
        max_records: Option<u32>,
    ) -> Result<Vec<RawRecord>> {
        let url = self.table_url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut req = self
                .http
                .get(url.clone())
                .bearer_auth(&self.config.api_key)
                .query(&[("pageSize", self.config.page_size.to_string())]);
            if let Some(formula) = formula {
                req = req.query(&[("filterByFormula", formula)]);
            }
            if let Some(max) = max_records {
                req = req.query(&[("maxRecords", max.to_string())]);
            }
            if let Some(ref offset) = offset {
                req = req.query(&[("offset", offset)]);
            }

            let page: ListPage = decode(req.send().await?).await?;
            debug!(page_records = page.records.len(), "record page fetched");
            records.extend(page.records);

            match page.offset {
                Some(next) if max_records.is_none_or(|max| records.len() < max as usize) => {
                    offset = Some(next);
                }
                _ => break,
            }
        }

        Ok(records)
    }

    /// Fetches a single record by ID. Returns `None` on 404.
    #[instrument(skip(self))]
    pub async fn get(&self, table: &str, record_id: &str) -> Result<Option<RawRecord>> {
        let url = self.table_url(table, Some(record_id))?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(resp).await.map(Some)
    }

    /// Patches the given fields of a record.
    #[instrument(skip(self, fields))]
    pub async fn patch(&self, table: &str, record_id: &str, fields: Map<String, Value>) -> Result<()> {
        let url = self.table_url(table, Some(record_id))?;
        let resp = self
            .http
            .patch(url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        let _: RawRecord = decode(resp).await?;
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RecordsError::Status {
            status: status.as_u16(),
            body,
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| RecordsError::decode(e.to_string()))
}

/// Quotes a value for use inside a filter formula string literal.
pub(crate) fn formula_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}
