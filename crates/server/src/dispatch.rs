//! The dispatch pipeline: one request moves through validation, service
//! invocation and response checking in a fixed order, and every terminal
//! outcome produces exactly one structured log record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tracing::{debug, error, info};

use schema::ValidatedValue;
use service::context::Context;
use service::errors::ServiceFailure;

use crate::errors::ApiError;
use crate::registry::{OperationDescriptor, OperationInput};
use crate::routes::AppState;

/// Per-request lifecycle. A request only ever moves forward; `Completed` and
/// `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    Received,
    Validating,
    Dispatched,
    Responding,
    Completed,
    Rejected,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Rejected)
    }
}

/// Owns the state value for one dispatch and only ever advances it.
pub struct DispatchTrace {
    state: RequestState,
}

impl DispatchTrace {
    pub fn new() -> Self {
        Self { state: RequestState::Received }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) {
        debug_assert!(!self.state.is_terminal(), "terminal state {:?} must not advance", self.state);
        debug_assert!(next > self.state, "state may not move backwards: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    /// Absorbing rejection, only legal from `Validating` (schema failure) or
    /// `Dispatched` (not-found).
    pub fn reject(&mut self) {
        debug_assert!(
            matches!(self.state, RequestState::Validating | RequestState::Dispatched),
            "reject from {:?}",
            self.state
        );
        self.state = RequestState::Rejected;
    }
}

impl Default for DispatchTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one request through the five dispatch phases. Path/method matching
/// already happened in the axum router built from the frozen registry;
/// unmatched requests land in [`route_not_found`] instead.
pub async fn dispatch(
    op: Arc<OperationDescriptor>,
    state: AppState,
    params: HashMap<String, String>,
    caller: Option<String>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let mut trace = DispatchTrace::new();
    let mut ctx = Context::new(state.request_timeout);
    if let Some(name) = caller {
        ctx = ctx.with_caller(name);
    }

    trace.advance(RequestState::Validating);
    let validated = match validate_request(&op, &body) {
        Ok(v) => v,
        Err(api_err) => {
            trace.reject();
            return finish(&op, &ctx, &trace, started, api_err);
        }
    };
    if let Some(v) = &validated {
        log_safe_fields(&op, &ctx, v);
    }

    trace.advance(RequestState::Dispatched);
    let input = OperationInput { params, body: validated };
    let result = match tokio::time::timeout(ctx.deadline, (op.handler)(ctx.clone(), input)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            trace.advance(RequestState::Responding);
            trace.advance(RequestState::Completed);
            return finish(&op, &ctx, &trace, started, ApiError::deadline_exceeded());
        }
    };

    match result {
        Ok(value) => {
            trace.advance(RequestState::Responding);
            match schema::validate(&op.response_schema, &value) {
                Ok(output) => {
                    trace.advance(RequestState::Completed);
                    log_dispatch(&op, &ctx, &trace, started, "success", op.success_status.as_u16());
                    (op.success_status, Json(output.into_inner())).into_response()
                }
                Err(err) => {
                    // A service returned a value its own contract forbids.
                    // Programming error: full detail to the log, opaque 500
                    // to the caller.
                    error!(
                        request_id = %ctx.request_id,
                        operation = op.name,
                        violations = ?err.violations,
                        "service output violates response schema"
                    );
                    trace.advance(RequestState::Completed);
                    finish(&op, &ctx, &trace, started, ApiError::internal())
                }
            }
        }
        Err(ServiceFailure::NotFound(msg)) => {
            trace.reject();
            finish(&op, &ctx, &trace, started, ApiError::not_found(msg))
        }
        Err(failure) => {
            trace.advance(RequestState::Responding);
            trace.advance(RequestState::Completed);
            finish(&op, &ctx, &trace, started, ApiError::from_failure(failure))
        }
    }
}

fn validate_request(op: &OperationDescriptor, body: &Bytes) -> Result<Option<ValidatedValue>, ApiError> {
    let Some(request_schema) = &op.request_schema else {
        return Ok(None);
    };
    let raw: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).map_err(|e| ApiError::invalid_body(e.to_string()))?
    };
    request_schema.validate(&raw).map(Some).map_err(ApiError::validation)
}

/// Payload fields reach the log only when the schema marks them safe.
fn log_safe_fields(op: &OperationDescriptor, ctx: &Context, validated: &ValidatedValue) {
    let Some(request_schema) = &op.request_schema else {
        return;
    };
    let safe = request_schema.loggable_fields();
    if safe.is_empty() {
        return;
    }
    if let Some(map) = validated.as_value().as_object() {
        let subset: serde_json::Map<String, Value> = map
            .iter()
            .filter(|(k, _)| safe.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let payload = Value::Object(subset);
        debug!(
            request_id = %ctx.request_id,
            operation = op.name,
            payload = %payload,
            "request payload (safe fields)"
        );
    }
}

fn finish(
    op: &OperationDescriptor,
    ctx: &Context,
    trace: &DispatchTrace,
    started: Instant,
    err: ApiError,
) -> Response {
    let outcome = format!("{:?}", err.kind());
    log_dispatch(op, ctx, trace, started, &outcome, err.status.as_u16());
    err.into_response()
}

fn log_dispatch(
    op: &OperationDescriptor,
    ctx: &Context,
    trace: &DispatchTrace,
    started: Instant,
    outcome: &str,
    status: u16,
) {
    info!(
        request_id = %ctx.request_id,
        operation = op.name,
        route = op.path,
        method = %op.method,
        outcome,
        state = ?trace.state(),
        status,
        latency_ms = started.elapsed().as_millis() as u64,
        "dispatch finished"
    );
}

/// Fallback for requests matching no registered operation.
pub async fn route_not_found(method: Method, uri: Uri) -> Response {
    let err = ApiError::route_not_found(&method, uri.path());
    info!(
        route = %uri.path(),
        method = %method,
        outcome = "NotFound",
        state = ?RequestState::Rejected,
        status = err.status.as_u16(),
        "dispatch rejected: no matching operation"
    );
    err.into_response()
}
