//! Per-client rate limiting stage.
//!
//! # Algorithm
//!
//! Each client identity owns a `governor` GCRA limiter in the shared
//! [`ClientTable`]: `LIMITER_BURST` requests at once, replenished at
//! `LIMITER_RPS` per second, starting with the full burst available. A request
//! over the quota is rejected with 429 and is not passed on.
//!
//! # Identity
//!
//! The identity comes from [`ClientIdentityResolver`] (peer address or a
//! trusted forwarding header). If it cannot be resolved the request fails with
//! 500 instead of bypassing the limiter.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Whole seconds until the client's next request would be admitted

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{error, warn};

use super::ip::ClientIdentityResolver;
use crate::error::AppError;
use crate::limiter::{Admission, ClientTable};
use crate::metrics::RequestMetrics;

#[derive(Clone)]
struct Limiter {
    table: Arc<ClientTable>,
    resolver: Arc<ClientIdentityResolver>,
    metrics: Arc<RequestMetrics>,
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let layer = RateLimitLayer::new(state.clients.clone(), resolver, state.metrics.clone());
/// let app = Router::new()
///     .route("/api", get(handler))
///     .layer(layer);
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    /// `None` when limiting is disabled
    limiter: Option<Limiter>,
}

impl RateLimitLayer {
    pub fn new(
        table: Arc<ClientTable>,
        resolver: ClientIdentityResolver,
        metrics: Arc<RequestMetrics>,
    ) -> Self {
        Self {
            limiter: Some(Limiter {
                table,
                resolver: Arc::new(resolver),
                metrics,
            }),
        }
    }

    /// Create a pass-through layer that admits every request.
    ///
    /// Use this when rate limiting is configured to be disabled.
    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Option<Limiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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

        let Some(limiter) = self.limiter.clone() else {
            return Box::pin(async move { inner.call(req).await });
        };

        // Decide before the future so the table lock never spans an await
        let decision = limiter
            .resolver
            .resolve(&req)
            .map(|client| (limiter.table.check(&client), client));

        Box::pin(async move {
            match decision {
                Ok((Admission::Allowed, _)) => inner.call(req).await,
                Ok((Admission::Rejected { retry_after }, client)) => {
                    limiter.metrics.record_rate_limit_rejection();

                    let retry_after_secs = retry_after_secs(retry_after);
                    warn!(
                        client_ip = %client,
                        path = %req.uri().path(),
                        retry_after_secs,
                        "Rate limit exceeded for client"
                    );

                    Ok(AppError::RateLimitExceeded { retry_after_secs }.into_response())
                }
                Err(e) => {
                    error!(error = %e, path = %req.uri().path(), "Could not resolve client identity");
                    Ok(AppError::Internal(e.to_string()).into_response())
                }
            }
        })
    }
}

/// Whole seconds to advertise in `Retry-After`, rounded up and at least 1.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    let secs = if wait.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    };
    secs.max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::ConnectInfo;
    use axum::http::{StatusCode, header};
    use tower::{ServiceExt, service_fn};

    use super::*;
    use crate::limiter::{ClientTableConfig, ManualClock};

    fn table(clock: Arc<ManualClock>) -> Arc<ClientTable> {
        Arc::new(ClientTable::new(
            ClientTableConfig {
                requests_per_second: 0.5,
                burst: 2,
                ..ClientTableConfig::default()
            },
            clock,
        ))
    }

    fn request_from(peer: &str) -> Request<Body> {
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    fn counting_service(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<Request<Body>, Response = Response<Body>, Error = Infallible, Future: Send>
    + Clone
    + Send
    + 'static {
        service_fn(move |_req: Request<Body>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }
        })
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(2)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(2001)), 3);
    }

    #[tokio::test]
    async fn test_rejects_after_burst_and_counts() {
        let clock = Arc::new(ManualClock::new());
        let metrics = Arc::new(RequestMetrics::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let service = RateLimitLayer::new(
            table(clock),
            ClientIdentityResolver::peer(),
            metrics.clone(),
        )
        .layer(counting_service(calls.clone()));

        for _ in 0..2 {
            let response = service
                .clone()
                .oneshot(request_from("192.0.2.1:1000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = service
            .clone()
            .oneshot(request_from("192.0.2.1:1001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        // At 0.5/s the next slot opens two seconds later
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.rate_limit_rejections(), 1);
    }

    #[tokio::test]
    async fn test_other_clients_unaffected() {
        let clock = Arc::new(ManualClock::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let service = RateLimitLayer::new(
            table(clock),
            ClientIdentityResolver::peer(),
            Arc::new(RequestMetrics::new()),
        )
        .layer(counting_service(calls.clone()));

        for _ in 0..3 {
            let _ = service
                .clone()
                .oneshot(request_from("192.0.2.1:1000"))
                .await
                .unwrap();
        }

        let response = service
            .clone()
            .oneshot(request_from("192.0.2.2:1000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_identity_fails_closed() {
        let clock = Arc::new(ManualClock::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let table = table(clock);
        let service = RateLimitLayer::new(
            table.clone(),
            ClientIdentityResolver::peer(),
            Arc::new(RequestMetrics::new()),
        )
        .layer(counting_service(calls.clone()));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = service.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_is_pass_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let layer = RateLimitLayer::disabled();
        assert!(!layer.is_enabled());
        let service = layer.layer(counting_service(calls.clone()));

        // No peer address and many requests: all admitted
        for _ in 0..10 {
            let req = Request::builder().uri("/").body(Body::empty()).unwrap();
            let response = service.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
