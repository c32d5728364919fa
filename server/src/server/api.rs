//! REST API for viewers.
//! Serves `{prefix}/queries` and `{prefix}/queries/clear` with JSON and CORS,
//! plus `/healthz`, `/readyz` and `/metrics`.

use crate::audit;
use crate::gateway::{PageQuery, QueryGateway};
use crate::metrics;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use lens_shared::types::page::ErrorResponse;
use serde::Serialize;
use std::time::Instant;

/// Shared per-server state.
#[derive(Clone)]
pub struct ApiState {
    pub gateway: QueryGateway,
    /// Normalized route prefix (`""` or `/segment`)
    pub prefix: String,
}

impl ApiState {
    pub fn new(gateway: QueryGateway, prefix: impl Into<String>) -> Self {
        Self {
            gateway,
            prefix: prefix.into(),
        }
    }
}

fn json_response<T: Serialize>(value: &T, status: StatusCode) -> Response<Body> {
    let (body, status) = match serde_json::to_string(value) {
        Ok(body) => (body, status),
        Err(e) => (
            format!(r#"{{"success":false,"error":"response encoding failed: {}"}}"#, e),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };
    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    add_cors_headers(res)
}

fn text_response(body: &'static str, status: StatusCode) -> Response<Body> {
    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    res
}

fn error_response(message: impl Into<String>, status: StatusCode) -> Response<Body> {
    json_response(&ErrorResponse::new(message), status)
}

fn cors_preflight() -> Response<Body> {
    let mut res = text_response("", StatusCode::NO_CONTENT);
    let headers = res.headers_mut();
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
    add_cors_headers(res)
}

fn add_cors_headers(mut res: Response<Body>) -> Response<Body> {
    res.headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    res
}

/// Parse `page`, `perPage`, `filter` and `search`. Missing or malformed
/// numbers fall back to the defaults; clamping happens in storage.
pub fn parse_page_query(query: Option<&str>) -> PageQuery {
    let mut parsed = PageQuery::default();
    let Some(query) = query else {
        return parsed;
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "page" => {
                if let Ok(n) = value.trim().parse() {
                    parsed.page = n;
                }
            }
            "perPage" | "per_page" => {
                if let Ok(n) = value.trim().parse() {
                    parsed.per_page = n;
                }
            }
            "filter" => parsed.filter = value.into_owned(),
            "search" => parsed.search = value.into_owned(),
            _ => {}
        }
    }
    parsed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Queries,
    Clear,
    Health,
    Ready,
    Metrics,
    NotFound,
}

impl Route {
    fn resolve(path: &str, prefix: &str) -> Self {
        match path {
            "/healthz" => return Route::Health,
            "/readyz" => return Route::Ready,
            "/metrics" => return Route::Metrics,
            _ => {}
        }
        let Some(rest) = path.strip_prefix(prefix) else {
            return Route::NotFound;
        };
        match rest.trim_end_matches('/') {
            "/queries" => Route::Queries,
            "/queries/clear" => Route::Clear,
            _ => Route::NotFound,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Route::Queries => "queries",
            Route::Clear => "clear",
            Route::Health => "healthz",
            Route::Ready => "readyz",
            Route::Metrics => "metrics",
            Route::NotFound => "not_found",
        }
    }
}

pub async fn handle_api(
    req: Request<Body>,
    state: ApiState,
) -> Result<Response<Body>, hyper::Error> {
    let started = Instant::now();
    let path = req.uri().path().to_string();
    let route = Route::resolve(&path, &state.prefix);

    let method = req.method().clone();
    let query = req.uri().query().map(str::to_string);
    let response = if method == Method::OPTIONS {
        cors_preflight()
    } else {
        dispatch(route, &method, query.as_deref(), &state).await
    };

    let status = response.status().as_u16();
    metrics::API_REQUESTS
        .with_label_values(&[route.label(), &status.to_string()])
        .inc();
    metrics::API_DURATION.observe(started.elapsed().as_secs_f64());
    if matches!(route, Route::Clear | Route::Ready | Route::Metrics) {
        audit::api_request(&path, status);
    }
    Ok(response)
}

async fn dispatch(
    route: Route,
    method: &Method,
    query: Option<&str>,
    state: &ApiState,
) -> Response<Body> {
    match (route, method) {
        (Route::Health, &Method::GET) => text_response("ok\n", StatusCode::OK),

        (Route::Ready, &Method::GET) => {
            let gateway = state.gateway.clone();
            match tokio::task::spawn_blocking(move || gateway.ready()).await {
                Ok(true) => text_response("ready\n", StatusCode::OK),
                _ => text_response("not ready\n", StatusCode::SERVICE_UNAVAILABLE),
            }
        }

        (Route::Metrics, &Method::GET) => {
            let mut res = Response::new(Body::from(metrics::encode_metrics()));
            res.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            res
        }

        (Route::Queries, &Method::GET) => {
            let query = parse_page_query(query);
            let gateway = state.gateway.clone();
            match tokio::task::spawn_blocking(move || gateway.get_page(&query)).await {
                Ok(Ok(page)) => json_response(&page, StatusCode::OK),
                Ok(Err(e)) => error_response(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
                Err(e) => {
                    tracing::error!("Query task failed: {}", e);
                    error_response(
                        "Database unavailable or logs table missing.",
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                }
            }
        }

        (Route::Clear, &Method::POST) => {
            let gateway = state.gateway.clone();
            match tokio::task::spawn_blocking(move || gateway.clear()).await {
                Ok(Ok(resp)) => {
                    audit::queries_cleared(resp.cleared);
                    json_response(&resp, StatusCode::OK)
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    audit::clear_failed(&message);
                    error_response(message, StatusCode::INTERNAL_SERVER_ERROR)
                }
                Err(e) => {
                    let message = format!("Failed to clear queries: {}", e);
                    audit::clear_failed(&message);
                    error_response(message, StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }

        (Route::NotFound, _) => error_response("not found", StatusCode::NOT_FOUND),

        _ => error_response("method not allowed", StatusCode::METHOD_NOT_ALLOWED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_query_defaults() {
        let q = parse_page_query(None);
        assert_eq!(q, PageQuery::default());

        let q = parse_page_query(Some("page=abc&perPage="));
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, 20);
    }

    #[test]
    fn test_parse_page_query_values() {
        let q = parse_page_query(Some("page=3&perPage=50&filter=failed&search=select+%2A"));
        assert_eq!(q.page, 3);
        assert_eq!(q.per_page, 50);
        assert_eq!(q.filter, "failed");
        assert_eq!(q.search, "select *");
    }

    #[test]
    fn test_route_resolution_with_prefix() {
        assert_eq!(Route::resolve("/lens/queries", "/lens"), Route::Queries);
        assert_eq!(Route::resolve("/lens/queries/clear", "/lens"), Route::Clear);
        assert_eq!(Route::resolve("/queries", "/lens"), Route::NotFound);
        assert_eq!(Route::resolve("/queries/", ""), Route::Queries);
        assert_eq!(Route::resolve("/healthz", "/lens"), Route::Health);
    }
}
