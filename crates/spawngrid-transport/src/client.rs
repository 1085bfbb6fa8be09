//! Pooled JSON-over-HTTP client for one backend.
//!
//! `ApiClient` is cheap to clone: clones share the same connection pool.
//! Construct one per backend and hand clones to every orchestrator.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{FixedServerNameResolver, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::pki_types::ServerName;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use spawngrid_core::TlsSettings;

use crate::error::{RemoteError, RemoteResult};
use crate::tls;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A completed 2xx response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| RemoteError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// HTTP client bound to one backend's base address.
#[derive(Clone)]
pub struct ApiClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    base: String,
    namespace: Option<String>,
    token: Option<(HeaderName, HeaderValue)>,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client for `address` using the given TLS settings.
    ///
    /// Plain `http://` addresses are accepted; TLS applies to `https://`.
    pub fn new(address: &str, tls_settings: &TlsSettings) -> RemoteResult<Self> {
        let tls_config = tls::client_config(tls_settings)?;

        let builder = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http();
        let builder = match &tls_settings.tls_server_name {
            Some(name) => {
                let server_name = ServerName::try_from(name.clone())
                    .map_err(|e| RemoteError::Tls(format!("tls_server_name {name:?}: {e}")))?;
                builder.with_server_name_resolver(FixedServerNameResolver::new(server_name))
            }
            None => builder,
        };
        let connector = builder.enable_http1().build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        let base = address.trim_end_matches('/').to_string();
        base.parse::<Uri>()
            .map_err(|e| RemoteError::Request(format!("address {address:?}: {e}")))?;

        debug!(%base, "api client created");
        Ok(Self {
            client,
            base,
            namespace: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Append `namespace=<ns>` to every request.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Send `token` in `header` on every request. Empty tokens are ignored.
    pub fn with_token(mut self, header: &'static str, token: Option<&str>) -> RemoteResult<Self> {
        self.token = match token.filter(|t| !t.is_empty()) {
            Some(t) => {
                let value = HeaderValue::from_str(t)
                    .map_err(|e| RemoteError::Request(format!("{header} value: {e}")))?;
                Some((HeaderName::from_static(header), value))
            }
            None => None,
        };
        Ok(self)
    }

    /// Per-request timeout (default 30s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> RemoteResult<ApiResponse> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> RemoteResult<ApiResponse> {
        self.send(Method::DELETE, path, query, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> RemoteResult<ApiResponse> {
        let bytes = body.map(encode).transpose()?;
        self.send(Method::POST, path, query, bytes).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> RemoteResult<ApiResponse> {
        let bytes = encode(body)?;
        self.send(Method::PUT, path, query, Some(bytes)).await
    }

    /// GET and decode JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> RemoteResult<T> {
        self.get(path, query).await?.json(path)
    }

    /// Send one request. Non-2xx responses become `RemoteError::Status`.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> RemoteResult<ApiResponse> {
        let uri = self.uri(path, query);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header("user-agent", "spawngrid/0.1")
            .header("accept", "application/json");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        if let Some((name, value)) = &self.token {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| RemoteError::Request(format!("{uri}: {e}")))?;

        let transport = |reason: String| RemoteError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            reason,
        };

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| transport(e.to_string()))?
                .to_bytes();
            Ok::<_, RemoteError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| transport(format!("timed out after {:?}", self.timeout)))??;

        debug!(%method, %path, status = status.as_u16(), "api call");

        if !status.is_success() {
            return Err(RemoteError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn uri(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut pairs: Vec<(&str, &str)> = Vec::with_capacity(query.len() + 1);
        if let Some(ns) = &self.namespace {
            pairs.push(("namespace", ns.as_str()));
        }
        pairs.extend_from_slice(query);

        let mut uri = format!("{}{}", self.base, path);
        for (i, (key, value)) in pairs.iter().enumerate() {
            uri.push(if i == 0 { '?' } else { '&' });
            uri.push_str(key);
            uri.push('=');
            uri.push_str(&encode_query_value(value));
        }
        uri
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> RemoteResult<Bytes> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| RemoteError::Request(format!("encode body: {e}")))
}

fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
