//! Thin wrapper over the HTTP client.
//!
//! The engine hands over a fully resolved request and gets back status,
//! body bytes and headers; everything transport-level (connection reuse,
//! timeouts, TLS) stays inside `reqwest`.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::swagger::Method;

#[derive(Debug, Clone, Default)]
pub struct RestRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub body: Option<Value>,
    pub basic_auth: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

pub struct RestClient {
    inner: reqwest::Client,
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RestClient {
    #[must_use]
    pub fn new() -> Self {
        RestClient {
            inner: reqwest::Client::new(),
        }
    }

    /// Executes one request. A form body wins over a JSON body when both
    /// are present, mirroring the content types the swagger declares.
    ///
    /// # Errors
    /// Any transport failure (including timeouts) surfaces as
    /// `Error::Http`.
    pub async fn execute(&self, req: RestRequest) -> Result<RestResponse> {
        let method = match req.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        };
        let mut builder = self.inner.request(method, &req.url);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        for (k, v) in &req.headers {
            builder = builder.header(k, v);
        }
        if let Some((user, pass)) = &req.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        if !req.form.is_empty() {
            builder = builder.form(&req.form);
        } else if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("{} {}: {e}", req.method, req.url)))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_owned(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?
            .to_vec();
        Ok(RestResponse {
            status,
            body,
            headers,
        })
    }
}
