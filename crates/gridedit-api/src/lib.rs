// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use gridedit_app::{
    CellValue, ColumnDescriptor, ColumnType, ForeignKeyOption, JsonRow, QueryPage, RowQuery,
    RowWindow, TableBackend,
};
use log::debug;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Blocking client for the table REST service.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed =
            Url::parse(trimmed).with_context(|| format!("api.base_url {trimmed:?} is not a URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("api.base_url must use http or https, got {}", parsed.scheme());
        }
        if parsed.cannot_be_a_base() {
            bail!("api.base_url {trimmed:?} cannot carry paths");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url: parsed,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Appends escaped path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("api.base_url cannot carry paths"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response> {
        debug!("{method} {url}");
        let response = build(self.http.request(method, url))
            .send()
            .map_err(|error| connection_error(self.base_url(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let response = self.send(Method::GET, url, |request| request)?;
        response.json().with_context(|| format!("decode {what}"))
    }

    fn send_row(&self, method: Method, table: &str, row: &JsonRow) -> Result<()> {
        let url = self.endpoint(&["tables", table, "data"])?;
        self.send(method, url, |request| request.json(row))?;
        Ok(())
    }
}

impl TableBackend for Client {
    fn list_tables(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["tables"])?;
        self.get_json(url, "table list")
    }

    fn row_count(&self, table: &str) -> Result<usize> {
        let url = self.endpoint(&["tables", table, "count"])?;
        let parsed: CountResponse = self.get_json(url, "row count")?;
        Ok(parsed.count)
    }

    fn table_schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let url = self.endpoint(&["tables", table, "schema"])?;
        let parsed: SchemaResponse = self.get_json(url, "table schema")?;
        Ok(parsed
            .columns
            .into_iter()
            .map(WireColumn::into_descriptor)
            .collect())
    }

    fn fetch_rows(&self, table: &str, window: Option<RowWindow>) -> Result<Vec<JsonRow>> {
        let mut url = self.endpoint(&["tables", table, "data"])?;
        if let Some(window) = window {
            url.query_pairs_mut()
                .append_pair("offset", &window.offset.to_string())
                .append_pair("limit", &window.limit.to_string());
        }
        self.get_json(url, "rows")
    }

    fn query_rows(&self, table: &str, query: &RowQuery) -> Result<QueryPage> {
        let url = self.endpoint(&["tables", table, "query"])?;
        let response = self.send(Method::POST, url, |request| request.json(query))?;
        response.json().context("decode query page")
    }

    fn create_row(&self, table: &str, row: &JsonRow) -> Result<()> {
        self.send_row(Method::POST, table, row)
    }

    fn update_row(&self, table: &str, row: &JsonRow) -> Result<()> {
        self.send_row(Method::PUT, table, row)
    }

    fn delete_row(&self, table: &str, row: &JsonRow) -> Result<()> {
        self.send_row(Method::DELETE, table, row)
    }

    fn foreign_key_options(&self, relation: &str) -> Result<Vec<ForeignKeyOption>> {
        let url = self.endpoint(&["foreign-keys", relation, "data"])?;
        let parsed: Vec<WireOption> = self.get_json(url, "foreign key options")?;
        parsed
            .into_iter()
            .map(|option| {
                Ok(ForeignKeyOption {
                    id: CellValue::from_json(&option.id)
                        .with_context(|| format!("option id in {relation}"))?,
                    name: option.name,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    #[serde(default)]
    columns: Vec<WireColumn>,
}

#[derive(Debug, Deserialize)]
struct WireColumn {
    name: String,
    #[serde(rename = "type", default)]
    data_type: String,
    #[serde(default)]
    key: bool,
    #[serde(rename = "foreignKeyName", default)]
    foreign_key_name: Option<String>,
    #[serde(default = "default_filterable")]
    filterable: bool,
}

const fn default_filterable() -> bool {
    true
}

impl WireColumn {
    fn into_descriptor(self) -> ColumnDescriptor {
        let mut descriptor = ColumnDescriptor::new(&self.name, ColumnType::parse(&self.data_type));
        if self.key {
            descriptor = descriptor.key();
        }
        descriptor.filterable = self.filterable;
        match self.foreign_key_name.as_deref().map(str::trim) {
            Some(relation) if !relation.is_empty() => descriptor.foreign_key(relation),
            _ => descriptor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireOption {
    id: serde_json::Value,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!("cannot reach {base_url} -- is the table service running? ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), error);
    }

    let body = body.trim();
    if !body.is_empty() && body.len() < 100 && !body.contains('{') {
        return anyhow!("server error ({}): {}", status.as_u16(), body);
    }

    anyhow!("server returned {}", status.as_u16())
}
