//! Loopback HTTP server with canned routes.
//!
//! Tests point an `ApiClient` at `StubServer::url()` and assert on the
//! recorded requests afterwards. Routes match on method and path (query
//! ignored) in registration order; a route with a `times` budget stops
//! matching once used up, so a later route for the same path takes over.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// One canned response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub body: String,
    times: Option<usize>,
}

impl StubResponse {
    pub fn json(method: &str, path: &str, status: u16, body: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            status,
            body: body.into(),
            times: None,
        }
    }

    /// Match at most `n` requests.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map_or(self.path_and_query.as_str(), |(p, _)| p)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

#[derive(Default)]
struct StubState {
    routes: Vec<StubResponse>,
    requests: Vec<RecordedRequest>,
}

impl StubState {
    fn respond(&mut self, method: &str, path: &str) -> (u16, String) {
        let route = self.routes.iter_mut().find(|r| {
            r.method == method && r.path == path && r.times.is_none_or(|n| n > 0)
        });
        match route {
            Some(route) => {
                if let Some(n) = route.times.as_mut() {
                    *n -= 1;
                }
                (route.status, route.body.clone())
            }
            None => (404, format!("no stub route for {method} {path}")),
        }
    }
}

/// Loopback server; aborted on drop.
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<Mutex<StubState>>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(routes: Vec<StubResponse>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(StubState {
            routes,
            requests: Vec::new(),
        }));

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(state.clone(), req));
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!(error = %e, "stub connection closed");
                    }
                });
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Add a route after start. It matches after existing routes.
    pub fn push(&self, route: StubResponse) {
        self.lock().routes.push(route);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Recorded requests for one method and path.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path() == path)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    state: Arc<Mutex<StubState>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let path = req.uri().path().to_string();
    let headers = req
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let (status, reply) = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.requests.push(RecordedRequest {
            method: method.clone(),
            path_and_query,
            headers,
            body,
        });
        state.respond(&method, &path)
    };

    let mut response = Response::new(Full::new(Bytes::from(reply)));
    *response.status_mut() =
        http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn times_budget_falls_through_to_next_route() {
        let mut state = StubState {
            routes: vec![
                StubResponse::json("GET", "/x", 200, "first").times(1),
                StubResponse::json("GET", "/x", 200, "second"),
            ],
            requests: Vec::new(),
        };
        assert_eq!(state.respond("GET", "/x").1, "first");
        assert_eq!(state.respond("GET", "/x").1, "second");
        assert_eq!(state.respond("GET", "/x").1, "second");
    }

    #[test]
    fn unmatched_route_is_404() {
        let mut state = StubState::default();
        assert_eq!(state.respond("PUT", "/nope").0, 404);
    }

    #[test]
    fn recorded_path_strips_query() {
        let req = RecordedRequest {
            method: "GET".to_string(),
            path_and_query: "/v1/job/a?namespace=default".to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        };
        assert_eq!(req.path(), "/v1/job/a");
    }
}
