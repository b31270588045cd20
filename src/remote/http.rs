use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    check_batch_len, NewRecord, RecordPatch, RemoteApiError, RemoteRecord, TableBackend,
};

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<RemoteRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordsEnvelope<T> {
    records: Vec<T>,
}

/// Table client speaking the hosted record-table REST dialect:
/// `{api_url}/{base_id}/{table}` with bearer auth.
#[derive(Debug, Clone)]
pub struct HttpTableClient {
    client: Client,
    base: Url,
    api_key: String,
}

impl HttpTableClient {
    pub fn new(api_url: &str, base_id: &str, api_key: &str) -> anyhow::Result<Self> {
        let raw = format!("{}/{}", api_url.trim_end_matches('/'), base_id);
        let base = Url::parse(&raw)
            .map_err(|e| anyhow::anyhow!("invalid table api url {}: {}", raw, e))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("table api url {} cannot carry a path", raw);
        }
        Ok(Self {
            client: Client::new(),
            base,
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str, record_id: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        url
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, v);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).headers(self.headers())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteApiError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| RemoteApiError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            body.trim().to_string()
        };
        Err(RemoteApiError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn list(
        &self,
        table: &str,
        formula: Option<&str>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        let mut out = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(f) = formula {
                query.push(("filterByFormula", f));
            }
            if let Some(o) = offset.as_deref() {
                query.push(("offset", o));
            }
            let builder = self
                .request(Method::GET, self.table_url(table, None))
                .query(&query);
            let page: ListPage = self
                .send(builder)
                .await?
                .json()
                .await
                .map_err(|e| RemoteApiError::Decode(e.to_string()))?;
            out.extend(page.records);
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn write_batch<T: Serialize + Send + Sync>(
        &self,
        method: Method,
        table: &str,
        records: Vec<T>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        check_batch_len(records.len())?;
        let builder = self
            .request(method, self.table_url(table, None))
            .json(&RecordsEnvelope { records });
        let written: RecordsEnvelope<RemoteRecord> = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(|e| RemoteApiError::Decode(e.to_string()))?;
        Ok(written.records)
    }
}

#[async_trait]
impl TableBackend for HttpTableClient {
    #[instrument(level = "debug", skip(self))]
    async fn list_all(&self, table: &str) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        let records = self.list(table, None).await?;
        debug!(count = records.len(), "listed records");
        Ok(records)
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_filtered(
        &self,
        table: &str,
        formula: &str,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        let records = self.list(table, Some(formula)).await?;
        debug!(count = records.len(), "listed filtered records");
        Ok(records)
    }

    #[instrument(level = "debug", skip(self, records), fields(len = records.len()))]
    async fn create_batch(
        &self,
        table: &str,
        records: Vec<NewRecord>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        self.write_batch(Method::POST, table, records).await
    }

    #[instrument(level = "debug", skip(self, records), fields(len = records.len()))]
    async fn update_batch(
        &self,
        table: &str,
        records: Vec<RecordPatch>,
    ) -> Result<Vec<RemoteRecord>, RemoteApiError> {
        self.write_batch(Method::PATCH, table, records).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_one(&self, table: &str, id: &str) -> Result<(), RemoteApiError> {
        let builder = self.request(Method::DELETE, self.table_url(table, Some(id)));
        self.send(builder).await?;
        Ok(())
    }
}
