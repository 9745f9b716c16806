//! HTTP Surface
//!
//! ```text
//! GET  /              version, connected database count, topology summary
//! GET  /info          the store's status report as a JSON object
//! GET  /favicon.ico   empty 200
//! *    /{db}[/{key}][/ttl|/type]   data requests (fallback route)
//! ```
//!
//! Every body is a [`ResultEnvelope`]. Data requests answer 200 whether they
//! succeeded or not; only a path that does not parse (500) and an unsupported
//! method (405) change the status code.
//!
//! Dispatch runs on its own task. A client that hangs up mid-request drops
//! the handler future, but the store commands it started still run to
//! completion on the shared connection.

use crate::commands::{
    CommandDispatcher, DispatchError, Params, RequestDescriptor, ResultEnvelope, Verb,
};
use crate::topology::Host;
use crate::VERSION;
use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, Method, StatusCode},
    response::Json,
    routing::get,
    Form, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: CommandDispatcher,
    /// Root of the discovered topology, when discovery is enabled.
    pub topology: Option<Arc<Host>>,
    pub info_disabled: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/info", get(info))
        .route("/favicon.ico", get(favicon))
        .fallback(data)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type Reply = (StatusCode, Json<ResultEnvelope>);

async fn root(State(state): State<AppState>) -> Json<ResultEnvelope> {
    let databases = state.dispatcher.router().connection_count().await;
    let topology = match &state.topology {
        Some(host) => Some(host.summary().await),
        None => None,
    };
    Json(ResultEnvelope::success(json!({
        "version": VERSION,
        "databases": databases,
        "topology": topology,
    })))
}

async fn info(State(state): State<AppState>) -> Json<ResultEnvelope> {
    if state.info_disabled {
        return Json(ResultEnvelope::failure(
            "Retrieving node information has been disabled.",
        ));
    }

    debug!("INFO");
    let report = match state.dispatcher.router().get(0).await {
        Ok(handle) => handle.lock().await.info("").await,
        Err(e) => Err(e),
    };
    match report {
        Ok(report) => Json(ResultEnvelope::success(json!(report))),
        Err(e) => Json(e.into()),
    }
}

async fn favicon() -> StatusCode {
    StatusCode::OK
}

async fn data(State(state): State<AppState>, req: Request) -> Reply {
    let Some(verb) = Verb::from_method(req.method().as_str()) else {
        let err = DispatchError::MethodNotAllowed(req.method().to_string());
        return (StatusCode::METHOD_NOT_ALLOWED, Json(err.into()));
    };

    let descriptor = match RequestDescriptor::from_path(req.uri().path()) {
        Ok(descriptor) => descriptor,
        Err(e) => return malformed(e),
    };

    let params = match read_params(req, &state).await {
        Ok(params) => params,
        Err(e) => return malformed(e),
    };
    let descriptor = descriptor.with_field(params.field());

    let dispatcher = state.dispatcher.clone();
    let task =
        tokio::spawn(async move { dispatcher.dispatch(verb, &descriptor, &params).await });
    match task.await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)),
        Err(e) => {
            error!(error = %e, "Dispatch task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(e.into()))
        }
    }
}

fn malformed(err: DispatchError) -> Reply {
    warn!(error = %err, "Rejected request");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(err.into()))
}

/// Query values, overlaid with a form body on POST and PUT.
async fn read_params(req: Request, state: &AppState) -> Result<Params, DispatchError> {
    let bad = |e: &dyn std::fmt::Display| DispatchError::MalformedRequest(e.to_string());

    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .map_err(|e| bad(&e))?;

    let has_form_body = (*req.method() == Method::POST || *req.method() == Method::PUT)
        && req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if !has_form_body {
        return Ok(Params::merged(query, HashMap::new()));
    }

    let Form(body) = Form::<HashMap<String, String>>::from_request(req, state)
        .await
        .map_err(|e| bad(&e))?;
    Ok(Params::merged(query, body))
}
