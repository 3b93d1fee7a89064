//! Request metrics stage.
//!
//! Outermost guard in the pipeline. Counts the request before anything else
//! runs, then records the status code of the response that actually leaves
//! the stack, whichever stage wrote it (handler, gate, limiter, or the panic
//! handler).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::metrics::RequestMetrics;

/// Layer recording into a shared [`RequestMetrics`].
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Metrics service wrapper.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

// Generic over the response body: the panic containment layer below this one
// changes the body type.
impl<S, ResBody> Service<Request<Body>> for MetricsService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let metrics = self.metrics.clone();
        let mut inner = self.inner.clone();
        let method = req.method().clone();

        metrics.record_request_received();
        let start = Instant::now();

        Box::pin(async move {
            let response = inner.call(req).await?;
            metrics.record_response(method.as_str(), response.status().as_u16(), start.elapsed());
            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;

    use axum::http::StatusCode;
    use tower::{ServiceExt, service_fn};

    use super::*;

    #[tokio::test]
    async fn test_records_emitted_status() {
        let metrics = Arc::new(RequestMetrics::new());
        let service = MetricsLayer::new(metrics.clone()).layer(service_fn(
            |req: Request<Body>| async move {
                let status = if req.uri().path() == "/missing" {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::OK
                };
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                Ok::<_, Infallible>(response)
            },
        ));

        for path in ["/", "/", "/missing"] {
            let req = Request::get(path).body(Body::empty()).unwrap();
            service.clone().oneshot(req).await.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_received, 3);
        assert_eq!(snapshot.responses_sent, 3);
        assert_eq!(snapshot.responses_by_status.get(&200), Some(&2));
        assert_eq!(snapshot.responses_by_status.get(&404), Some(&1));
    }
}
