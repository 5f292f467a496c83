use crate::error::QueryError;
use crate::telemetry::cache::Cache;
use crate::telemetry::reading::Reading;
use serde::Deserialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

pub const ALL_READINGS_PATH: &str = "api/endpoints/get_data_all";
pub const MUNICIPALITY_PATH: &str = "api/endpoints/get_municipality_streetlights";
pub const BARANGAY_PATH: &str = "api/endpoints/get_barangay_streetlights";
pub const DETAILS_PATH: &str = "api/endpoints/get_details";
pub const COUNT_PATH: &str = "api/endpoints/get_count";

pub type Result<T> = std::result::Result<T, QueryError>;

/// A read-only JSON data source.
///
/// Implementations return the decoded response body, whatever its
/// `status`; interpreting the envelope is the query layer's job.
#[allow(async_fn_in_trait)]
pub trait Endpoint {
    async fn fetch(&self, path: &str, params: &[(&str, &str)]) -> Result<Value>;
}

/// Endpoint backed by the PHP API over HTTP.
pub struct HttpEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEndpoint {
    pub fn new(base_url: &str) -> Self {
        info!("Initializing HTTP endpoint with base url: {}", base_url);
        HttpEndpoint {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Endpoint for HttpEndpoint {
    async fn fetch(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                error!("Request to {} failed: {}", path, e);
                QueryError::Transport(format!("{}: {}", path, e))
            })?;

        let status = response.status();
        response.json::<Value>().await.map_err(|e| {
            error!("Undecodable response from {} (HTTP {}): {}", path, status, e);
            QueryError::Transport(format!("{} (HTTP {}): {}", path, status, e))
        })
    }
}

/// Serves canned payloads keyed by path and parameters, and records
/// every request it receives.
#[derive(Default)]
pub struct MemoryEndpoint {
    responses: HashMap<String, Result<Value>>,
    calls: RefCell<Vec<String>>,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, params: &[(&str, &str)], body: Value) -> Self {
        self.responses.insert(request_key(path, params), Ok(body));
        self
    }

    pub fn failing(mut self, path: &str, params: &[(&str, &str)], err: QueryError) -> Self {
        self.responses.insert(request_key(path, params), Err(err));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split('?').next() == Some(path))
            .count()
    }
}

impl Endpoint for MemoryEndpoint {
    async fn fetch(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let key = request_key(path, params);
        self.calls.borrow_mut().push(key.clone());
        match self.responses.get(&key) {
            Some(response) => response.clone(),
            None => Err(QueryError::Transport(format!("{}: no route", key))),
        }
    }
}

fn request_key(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    format!("{}?{}", path, pairs.join("&"))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    count: Value,
}

fn open_envelope(path: &str, body: Value) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_value(body).map_err(|e| {
        error!("Malformed envelope from {}: {}", path, e);
        QueryError::Transport(format!("{}: malformed envelope: {}", path, e))
    })?;

    match envelope.status.as_str() {
        "success" => Ok(envelope),
        "error" => {
            let message = envelope
                .message
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!("{} reported an error: {}", path, message);
            Err(QueryError::Remote { message })
        }
        other => Err(QueryError::Transport(format!(
            "{}: unexpected status {:?}",
            path, other
        ))),
    }
}

/// Decodes a reading list, dropping records that do not decode.
fn decode_readings(path: &str, data: &Value) -> Result<Vec<Reading>> {
    let items = match data {
        Value::Array(items) => items.as_slice(),
        Value::Null => return Ok(Vec::new()),
        Value::Object(_) => std::slice::from_ref(data),
        other => {
            return Err(QueryError::Transport(format!(
                "{}: expected a list of readings, got {}",
                path, other
            )));
        }
    };

    let mut readings = Vec::with_capacity(items.len());
    for item in items {
        match Reading::deserialize(item) {
            Ok(reading) => readings.push(reading),
            Err(e) => warn!("Skipping undecodable reading from {}: {}", path, e),
        }
    }
    Ok(readings)
}

fn decode_count(path: &str, count: &Value) -> Result<u64> {
    let parsed = match count {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| QueryError::Transport(format!("{}: invalid count {}", path, count)))
}

/// Typed access to the five read endpoints, memoizing the full and
/// municipality-scoped datasets.
pub struct QueryLayer<E> {
    endpoint: E,
    cache: Cache,
}

impl<E: Endpoint> QueryLayer<E> {
    pub fn new(endpoint: E, cache: Cache) -> Self {
        QueryLayer { endpoint, cache }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub async fn all_readings(&mut self) -> Result<Vec<Reading>> {
        self.cached_readings("all", ALL_READINGS_PATH, &[]).await
    }

    pub async fn municipality_readings(&mut self, municipality: &str) -> Result<Vec<Reading>> {
        let key = format!("municipality:{}", municipality);
        self.cached_readings(&key, MUNICIPALITY_PATH, &[("municipality", municipality)])
            .await
    }

    pub async fn barangay_readings(
        &self,
        municipality: &str,
        barangay: &str,
    ) -> Result<Vec<Reading>> {
        let params = [("municipality", municipality), ("barangay", barangay)];
        let body = self.endpoint.fetch(BARANGAY_PATH, &params).await?;
        let envelope = open_envelope(BARANGAY_PATH, body)?;
        decode_readings(BARANGAY_PATH, &envelope.data)
    }

    /// History for one device, oldest first.
    pub async fn device_details(&self, id: &str) -> Result<Vec<Reading>> {
        let body = self.endpoint.fetch(DETAILS_PATH, &[("socid", id)]).await?;
        let envelope = open_envelope(DETAILS_PATH, body)?;
        let mut readings = decode_readings(DETAILS_PATH, &envelope.data)?;
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    pub async fn count(&self, pattern: &str) -> Result<u64> {
        let body = self.endpoint.fetch(COUNT_PATH, &[("pattern", pattern)]).await?;
        let envelope = open_envelope(COUNT_PATH, body)?;
        decode_count(COUNT_PATH, &envelope.count)
    }

    async fn cached_readings(
        &mut self,
        key: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<Reading>> {
        if let Some(payload) = self.cache.get(key) {
            return decode_readings(path, payload);
        }

        let body = self.endpoint.fetch(path, params).await?;
        let envelope = open_envelope(path, body)?;
        let readings = decode_readings(path, &envelope.data)?;
        info!("Fetched {} readings from {}", readings.len(), path);
        self.cache.put(key, envelope.data);
        Ok(readings)
    }
}
