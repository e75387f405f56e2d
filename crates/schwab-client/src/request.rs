//! Request plumbing shared by all endpoint wrappers
//!
//! Every call takes one transport snapshot and one token snapshot up front
//! and uses them for the whole request, so a rotation that happens mid-call
//! never affects it. Bodies are forwarded as-is; nothing here interprets
//! brokerage payloads.

use std::time::Instant;

use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode, Url};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, instrument};

use crate::client::Client;
use crate::error::{Error, Result};

/// Query parameters; `None` values are dropped.
#[derive(Debug, Default, Clone)]
pub struct Params(Vec<(&'static str, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl ToString) -> Self {
        self.0.push((key, value.to_string()));
        self
    }

    pub fn opt<V: ToString>(self, key: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    pub fn time(self, key: &'static str, value: Option<OffsetDateTime>, format: TimeFormat) -> Self {
        self.opt(key, value.map(|t| format_time(t, format)))
    }

    /// Append every pair from `other`.
    pub fn extend(mut self, other: Params) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.0
    }
}

/// Join symbols or field names into the comma-separated form the API expects.
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Time encodings used by different endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// `2024-03-01T14:30:00.000Z`
    Iso8601,
    /// Seconds since the unix epoch
    Epoch,
    /// Milliseconds since the unix epoch
    EpochMillis,
    /// `2024-03-01`
    Date,
}

pub fn format_time(value: OffsetDateTime, format: TimeFormat) -> String {
    let utc = value.to_offset(time::UtcOffset::UTC);
    match format {
        TimeFormat::Iso8601 => utc
            .format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
            ))
            .unwrap_or_default(),
        TimeFormat::Epoch => utc.unix_timestamp().to_string(),
        TimeFormat::EpochMillis => (utc.unix_timestamp_nanos() / 1_000_000).to_string(),
        TimeFormat::Date => value
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_default(),
    }
}

/// Response body, classified by content type only.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary(Bytes),
}

#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ApiResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let mime = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;

        let body = match mime.as_str() {
            "application/json" => match serde_json::from_slice(&bytes) {
                Ok(value) => ResponseBody::Json(value),
                Err(e) => {
                    debug!(error = %e, "response declared JSON but did not parse");
                    ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
            },
            "text/html" | "text/plain" => {
                ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => ResponseBody::Binary(bytes),
        };
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl Client {
    /// Build the URL for `segments` under the configured base URL.
    ///
    /// Each segment is percent-encoded, so symbols like `/ES` or `BRK.B` are safe.
    pub fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config().base_url)
            .map_err(|e| Error::InvalidRequest(format!("invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidRequest("base_url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issue one authorized request and read the whole response.
    #[instrument(skip_all, fields(method = %method, path = %segments.join("/")))]
    pub async fn send(
        &self,
        method: Method,
        segments: &[&str],
        params: Params,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let url = self.endpoint_url(segments)?;
        let transport = self.current_transport()?;
        let token = self.current_token();

        let mut request = transport
            .client()?
            .request(method.clone(), url)
            .header(AUTHORIZATION, token.header_value())
            .header(ACCEPT, "application/json")
            .timeout(self.config().timeout);
        if !params.is_empty() {
            request = request.query(params.pairs());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        crate::metrics::record_request(
            method.as_str(),
            status.as_u16(),
            started.elapsed().as_secs_f64(),
        );
        debug!(
            status = status.as_u16(),
            transport_version = transport.version(),
            "request completed"
        );
        ApiResponse::read(response).await
    }
}
