//! Cross-origin stage.
//!
//! Reflects a trusted `Origin` back in `Access-Control-Allow-Origin` and
//! answers preflight requests from trusted origins directly:
//!
//! ```text
//!   Origin not trusted / absent     ──► no CORS headers, request continues
//!   Origin trusted                  ──► Access-Control-Allow-Origin: <origin>
//!   Origin trusted + preflight      ──► 200, allow-methods/headers, handler not called
//! ```
//!
//! A preflight is an `OPTIONS` request carrying a non-empty
//! `Access-Control-Request-Method`. Matching is exact and there is no
//! wildcard. Every response gets `Vary: Origin` and
//! `Vary: Access-Control-Request-Method`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use tower::{Layer, Service};
use tracing::trace;

/// Methods advertised in preflight responses.
pub const ALLOWED_METHODS: &str = "OPTIONS, PUT, PATCH, DELETE";

/// Request headers advertised in preflight responses.
pub const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

/// Cross-origin layer over an immutable trusted-origin list.
#[derive(Clone, Debug, Default)]
pub struct CorsLayer {
    trusted_origins: Arc<[String]>,
}

impl CorsLayer {
    pub fn new(trusted_origins: Vec<String>) -> Self {
        Self {
            trusted_origins: trusted_origins.into(),
        }
    }
}

impl<S> Layer<S> for CorsLayer {
    type Service = CorsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorsService {
            inner,
            trusted_origins: self.trusted_origins.clone(),
        }
    }
}

/// Cross-origin service wrapper.
#[derive(Clone)]
pub struct CorsService<S> {
    inner: S,
    trusted_origins: Arc<[String]>,
}

impl<S> Service<Request<Body>> for CorsService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let allowed_origin = trusted_origin(req.headers(), &self.trusted_origins);
        let preflight = allowed_origin.is_some() && is_preflight(&req);

        Box::pin(async move {
            let mut response = if preflight {
                trace!("Answering CORS preflight");
                preflight_response()
            } else {
                inner.call(req).await?
            };

            let headers = response.headers_mut();
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
            headers.append(
                header::VARY,
                HeaderValue::from_static("Access-Control-Request-Method"),
            );
            if let Some(origin) = allowed_origin {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }

            Ok(response)
        })
    }
}

/// The request's `Origin` if it exactly matches a trusted entry.
fn trusted_origin(headers: &HeaderMap, trusted: &[String]) -> Option<HeaderValue> {
    let origin = headers.get(header::ORIGIN)?;
    let value = origin.to_str().ok()?;
    trusted
        .iter()
        .any(|t| !t.is_empty() && t == value)
        .then(|| origin.clone())
}

fn is_preflight<B>(req: &Request<B>) -> bool {
    req.method() == Method::OPTIONS
        && req
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .is_some_and(|method| !method.is_empty())
}

fn preflight_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::to_bytes;
    use tower::{ServiceExt, service_fn};

    use super::*;

    const TRUSTED: &str = "https://app.example";

    async fn call(req: Request<Body>, calls: Arc<AtomicUsize>) -> Response<Body> {
        CorsLayer::new(vec![TRUSTED.to_string(), "https://admin.example".to_string()])
            .layer(service_fn(move |_req: Request<Body>| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Response::new(Body::from("handled")))
                }
            }))
            .oneshot(req)
            .await
            .unwrap()
    }

    fn vary_values(response: &Response<Body>) -> Vec<&str> {
        response
            .headers()
            .get_all(header::VARY)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_trusted_origin_reflected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::get("/")
            .header(header::ORIGIN, TRUSTED)
            .body(Body::empty())
            .unwrap();
        let response = call(req, calls.clone()).await;

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            TRUSTED
        );
        assert!(vary_values(&response).contains(&"Origin"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untrusted_origin_gets_no_cors_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::get("/")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = call(req, calls.clone()).await;

        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
        assert_eq!(
            vary_values(&response),
            vec!["Origin", "Access-Control-Request-Method"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trusted_preflight_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/v1/movies/1")
            .header(header::ORIGIN, TRUSTED)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap();
        let response = call(req, calls.clone()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            ALLOWED_METHODS
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            ALLOWED_HEADERS
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            TRUSTED
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_untrusted_preflight_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, "https://evil.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap();
        let response = call(req, calls.clone()).await;

        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_METHODS)
                .is_none()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_options_from_trusted_origin_is_not_preflight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, TRUSTED)
            .body(Body::empty())
            .unwrap();
        let response = call(req, calls.clone()).await;

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            TRUSTED
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_request_method_is_not_preflight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, TRUSTED)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "")
            .body(Body::empty())
            .unwrap();
        let response = call(req, calls.clone()).await;

        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_METHODS)
                .is_none()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_origin_matching_is_exact() {
        let trusted = vec![TRUSTED.to_string()];
        let mut headers = HeaderMap::new();

        for origin in ["https://app.example/", "http://app.example", "HTTPS://APP.EXAMPLE"] {
            headers.insert(header::ORIGIN, HeaderValue::from_static(origin));
            assert!(trusted_origin(&headers, &trusted).is_none(), "{origin}");
        }

        headers.insert(header::ORIGIN, HeaderValue::from_static(TRUSTED));
        assert!(trusted_origin(&headers, &trusted).is_some());
    }
}
