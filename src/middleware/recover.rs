//! Panic containment stage.
//!
//! Wraps `tower_http`'s `CatchPanicLayer` with a handler that turns a panic
//! anywhere below it into the standard JSON 500 response. The response carries
//! `Connection: close` so the server does not reuse the connection after the
//! fault.
//!
//! Requires `panic = "unwind"` (the default); with `abort` the process dies
//! before the layer can run.

use std::any::Any;

use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use crate::error::AppError;

/// Signature of [`handle_panic`] as a plain function pointer, so the layer
/// type can be named.
pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// The panic containment layer.
pub type RecoverPanicLayer = CatchPanicLayer<PanicHandler>;

/// Build the panic containment layer.
pub fn recover_panic_layer() -> RecoverPanicLayer {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

/// Convert a caught panic payload into a 500 response.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    error!(panic = %detail, "Handler panicked, closing connection");

    let mut response = AppError::Internal(format!("panic: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
