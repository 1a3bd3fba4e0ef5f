use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, RawPathParams};
use axum::http::{Method, StatusCode};
use axum::routing::{on, MethodFilter};
use axum::Router;

use schema::{ObjectSchema, Schema, ValidatedValue};
use service::context::Context;
use service::errors::ServiceResult;

use crate::access::Caller;
use crate::dispatch;
use crate::errors::StartupError;
use crate::routes::AppState;

/// Input handed to a bound service function: path parameters plus the
/// schema-validated body (present exactly when the descriptor declares a
/// request schema).
pub struct OperationInput {
    pub params: HashMap<String, String>,
    pub body: Option<ValidatedValue>,
}

impl OperationInput {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

pub type ServiceHandler = Arc<
    dyn Fn(Context, OperationInput) -> Pin<Box<dyn Future<Output = ServiceResult<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Static binding of one HTTP route to one service operation. Constructed
/// once at startup and immutable afterwards; the registry owns the table.
#[derive(Clone)]
pub struct OperationDescriptor {
    /// Stable operation name used in dispatch log records.
    pub name: &'static str,
    pub method: Method,
    /// Route in axum syntax, e.g. `/api/items/:id`.
    pub path: &'static str,
    pub request_schema: Option<ObjectSchema>,
    pub response_schema: Schema,
    pub success_status: StatusCode,
    pub handler: ServiceHandler,
}

/// The frozen route table. `register` rejects duplicate (path, method) pairs
/// before the process ever serves a request; `into_router` converts the
/// table into the axum router that performs path/method matching.
#[derive(Default)]
pub struct Registry {
    ops: Vec<OperationDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, op: OperationDescriptor) -> Result<(), StartupError> {
        if self.ops.iter().any(|o| o.path == op.path && o.method == op.method) {
            return Err(StartupError::DuplicateRoute {
                method: op.method.clone(),
                path: op.path.to_string(),
            });
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_router(self, state: AppState) -> Result<Router, StartupError> {
        let mut router = Router::new();
        for op in self.ops {
            let filter = MethodFilter::try_from(op.method.clone())
                .map_err(|e| StartupError::InvalidRoute(e.to_string()))?;
            let path = op.path;
            let op = Arc::new(op);
            let state = state.clone();
            let handler = move |raw_params: RawPathParams,
                                caller: Option<Extension<Caller>>,
                                body: Bytes| {
                let op = Arc::clone(&op);
                let state = state.clone();
                async move {
                    let params: HashMap<String, String> = raw_params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    let caller = caller.map(|Extension(Caller(name))| name);
                    dispatch::dispatch(op, state, params, caller, body).await
                }
            };
            router = router.route(path, on(filter, handler));
        }
        Ok(router)
    }
}
