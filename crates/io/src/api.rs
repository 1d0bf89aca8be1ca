// REST import/export
//
// Import sends one request and reads the table out of the JSON response.
// Export sends the table as an array of header-keyed objects, or as CSV
// text, optionally wrapped in a `{ "<dataKey>": ... }` envelope.
//
// Configs are plain JSON files (camelCase keys) so a source or destination
// can be saved once and reused.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use promptgrid_engine::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{json, IoError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("promptgrid/", env!("CARGO_PKG_VERSION"));
/// Longest slice of an error body quoted in messages
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_reqwest().as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiImportConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body; ignored for GET
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Dotted path to the array in the response, e.g. `data.items`.
    /// Numeric segments index into arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    /// Response key to column name. Unmapped keys keep their name.
    #[serde(default)]
    pub header_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExportConfig {
    pub url: String,
    /// POST or PUT
    #[serde(default = "default_export_method")]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub format: PayloadFormat,
    /// Wrap the payload as `{ "<dataKey>": payload }`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
}

fn default_export_method() -> HttpMethod {
    HttpMethod::Post
}

fn load_config<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, IoError> {
    let text = std::fs::read_to_string(path).map_err(|e| IoError::file(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

fn save_config<T: Serialize>(config: &T, path: &Path) -> Result<(), IoError> {
    let text = serde_json::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|e| IoError::file(path, e))
}

impl ApiImportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, IoError> {
        load_config(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        save_config(self, path)
    }
}

impl ApiExportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_export_method(),
            headers: BTreeMap::new(),
            format: PayloadFormat::default(),
            data_key: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, IoError> {
        let config: Self = load_config(path)?;
        config.check_method()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        save_config(self, path)
    }

    fn check_method(&self) -> Result<(), IoError> {
        match self.method {
            HttpMethod::Post | HttpMethod::Put => Ok(()),
            other => Err(IoError::Api(format!("export method must be POST or PUT, not {}", other))),
        }
    }
}

/// Follow a dotted path into a JSON response
fn select_path<'a>(value: &'a Value, path: &str) -> Result<&'a Value, IoError> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            IoError::Layout(format!("data path '{}' has no '{}'", path, segment))
        })?;
    }
    Ok(current)
}

/// Build a table from a decoded API response
pub fn table_from_response(response: &Value, config: &ApiImportConfig) -> Result<Table, IoError> {
    let data = match config.data_path.as_deref() {
        Some(path) => select_path(response, path)?,
        None => response,
    };
    if !data.is_array() {
        return Err(IoError::Layout("API data must be an array".into()));
    }

    let mut table = json::import_value(data, true)?;
    for header in &mut table.headers {
        if let Some(name) = config.header_mapping.get(header.as_str()) {
            *header = name.clone();
        }
    }
    Ok(table)
}

/// Request body and content type for an export
pub fn export_payload(table: &Table, config: &ApiExportConfig) -> Result<(String, &'static str), IoError> {
    let data = match config.format {
        PayloadFormat::Json => json::to_value(table),
        PayloadFormat::Csv => {
            let mut buf = Vec::new();
            crate::csv::write_table(table, &mut buf, b',')?;
            let text = String::from_utf8(buf).map_err(|e| IoError::Api(e.to_string()))?;
            match &config.data_key {
                Some(_) => Value::String(text),
                None => return Ok((text, "text/csv")),
            }
        }
    };

    let payload = match &config.data_key {
        Some(key) => {
            let mut envelope = serde_json::Map::new();
            envelope.insert(key.clone(), data);
            Value::Object(envelope)
        }
        None => data,
    };
    Ok((serde_json::to_string(&payload)?, "application/json"))
}

fn client() -> Result<reqwest::Client, IoError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| IoError::Api(e.to_string()))
}

fn with_headers(mut request: reqwest::RequestBuilder, headers: &BTreeMap<String, String>) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

/// Send the request and return the body of a 2xx response
async fn send(request: reqwest::RequestBuilder, what: &str) -> Result<String, IoError> {
    let response = request
        .send()
        .await
        .map_err(|e| IoError::Api(format!("{}: {}", what, e.without_url())))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| IoError::Api(format!("{}: {}", what, e.without_url())))?;

    if !status.is_success() {
        let detail: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
        return Err(IoError::Api(format!("{} returned {}: {}", what, status.as_u16(), detail)));
    }
    Ok(body)
}

/// Fetch a table from a REST endpoint
pub async fn fetch_table(config: &ApiImportConfig) -> Result<Table, IoError> {
    let what = format!("{} {}", config.method, config.url);
    let mut request = with_headers(
        client()?.request(config.method.as_reqwest(), &config.url),
        &config.headers,
    );
    if config.method != HttpMethod::Get {
        if let Some(body) = &config.body {
            request = request.json(body);
        }
    }

    let body = send(request, &what).await?;
    let response: Value = serde_json::from_str(&body)?;
    let table = table_from_response(&response, config)?;
    log::debug!(
        "Fetched {} ({} columns, {} rows)",
        what,
        table.width(),
        table.rows.len()
    );
    Ok(table)
}

/// Send a table to a REST endpoint
pub async fn push_table(table: &Table, config: &ApiExportConfig) -> Result<(), IoError> {
    config.check_method()?;
    let what = format!("{} {}", config.method, config.url);
    let (payload, content_type) = export_payload(table, config)?;

    let mut request = client()?.request(config.method.as_reqwest(), &config.url);
    let typed = config
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case("content-type"));
    if !typed {
        request = request.header(reqwest::header::CONTENT_TYPE, content_type);
    }
    let request = with_headers(request, &config.headers).body(payload);

    send(request, &what).await?;
    log::debug!("Sent {} row(s) to {}", table.rows.len(), what);
    Ok(())
}
