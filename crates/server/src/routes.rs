use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, StatusCode};
use axum::routing::get;
use axum::{middleware, Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};
use tracing::{info, Level};
use uuid::Uuid;

use common::types::{Health, ServiceBanner};
use configs::{AppConfig, CorsConfig};
use schema::{FieldSpec, NumberSchema, ObjectSchema, Schema, StringSchema};
use service::errors::ServiceFailure;
use service::items::{ItemInput, ItemStore};
use service::suppliers::SupplierService;

use crate::access::{self, AccessState};
use crate::dispatch;
use crate::errors::StartupError;
use crate::registry::{OperationDescriptor, OperationInput, Registry, ServiceHandler};

/// Shared components injected into every operation. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub items: Arc<ItemStore>,
    pub suppliers: Arc<SupplierService>,
    pub access: Arc<AccessState>,
    pub request_timeout: Duration,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn root() -> Json<ServiceBanner> {
    Json(ServiceBanner { service: "purchasing-backend", version: env!("CARGO_PKG_VERSION") })
}

const RISK_LEVELS: [&str; 4] = ["Low", "Medium", "High", "N/A"];

fn item_input_schema() -> Result<ObjectSchema, StartupError> {
    let item_code = StringSchema::new()
        .non_empty()
        .max_len(64)
        .pattern("^[0-9A-Za-z_-]+$")
        .map_err(|e| StartupError::InvalidSchema(e.to_string()))?
        .build();
    Ok(ObjectSchema::new()
        .field(FieldSpec::required("item_code", item_code).safe_to_log())
        .field(FieldSpec::required(
            "item_name",
            StringSchema::new().non_empty().max_len(200).build(),
        ))
        .field(FieldSpec::optional(
            "risk_level",
            StringSchema::new().one_of(RISK_LEVELS).build(),
        ))
        .field(FieldSpec::optional("current_stock", NumberSchema::new().min(0.0).build()))
        .field(FieldSpec::optional("wks_to_oos", NumberSchema::new().min(0.0).build())))
}

fn item_record_schema() -> Schema {
    ObjectSchema::new()
        .field(FieldSpec::required("id", StringSchema::new().non_empty().build()))
        .field(FieldSpec::required("item_code", StringSchema::new().non_empty().build()))
        .field(FieldSpec::required("item_name", StringSchema::new().non_empty().build()))
        .field(FieldSpec::required("risk_level", StringSchema::new().non_empty().build()))
        .field(FieldSpec::optional("current_stock", NumberSchema::new().min(0.0).build()))
        .field(FieldSpec::optional("wks_to_oos", NumberSchema::new().min(0.0).build()))
        .field(FieldSpec::required("created_at", StringSchema::new().non_empty().build()))
        .build()
}

fn item_list_schema() -> Schema {
    ObjectSchema::new()
        .field(FieldSpec::required(
            "items",
            Schema::Sequence(Box::new(item_record_schema())),
        ))
        .build()
}

fn supplier_schema() -> Schema {
    ObjectSchema::new()
        .field(FieldSpec::required("supplier_id", StringSchema::new().non_empty().build()))
        .field(FieldSpec::required("name", StringSchema::new().non_empty().build()))
        .field(FieldSpec::required("status", StringSchema::new().non_empty().build()))
        .build()
}

fn deleted_schema() -> Schema {
    ObjectSchema::new()
        .field(FieldSpec::required("deleted", Schema::Boolean))
        .build()
}

fn parse_item_id(input: &OperationInput) -> Result<Uuid, ServiceFailure> {
    let raw = input
        .param("id")
        .ok_or_else(|| ServiceFailure::Internal("route is missing the id parameter".into()))?;
    Uuid::parse_str(raw)
        .map_err(|_| ServiceFailure::Validation(format!("id must be a UUID, got {raw:?}")))
}

fn list_items(items: Arc<ItemStore>) -> ServiceHandler {
    Arc::new(move |_ctx, _input| {
        let items = items.clone();
        Box::pin(async move {
            let list = items.list().await;
            Ok(serde_json::json!({ "items": list }))
        })
    })
}

fn create_item(items: Arc<ItemStore>) -> ServiceHandler {
    Arc::new(move |_ctx, input| {
        let items = items.clone();
        Box::pin(async move {
            let body = input.body.ok_or_else(|| {
                ServiceFailure::Internal("create_item invoked without a validated body".into())
            })?;
            let item: ItemInput = body.deserialize_into().map_err(ServiceFailure::internal)?;
            let rec = items.create(item).await?;
            serde_json::to_value(rec).map_err(ServiceFailure::internal)
        })
    })
}

fn get_item(items: Arc<ItemStore>) -> ServiceHandler {
    Arc::new(move |_ctx, input| {
        let items = items.clone();
        Box::pin(async move {
            let id = parse_item_id(&input)?;
            let rec = items.get(id).await?;
            serde_json::to_value(rec).map_err(ServiceFailure::internal)
        })
    })
}

fn delete_item(items: Arc<ItemStore>) -> ServiceHandler {
    Arc::new(move |_ctx, input| {
        let items = items.clone();
        Box::pin(async move {
            let id = parse_item_id(&input)?;
            if items.delete(id).await? {
                Ok(serde_json::json!({ "deleted": true }))
            } else {
                Err(ServiceFailure::not_found("item"))
            }
        })
    })
}

fn get_supplier(suppliers: Arc<SupplierService>) -> ServiceHandler {
    Arc::new(move |ctx, input| {
        let suppliers = suppliers.clone();
        Box::pin(async move {
            let id = input
                .param("id")
                .ok_or_else(|| ServiceFailure::Internal("route is missing the id parameter".into()))?
                .to_string();
            let rec = suppliers.fetch(&ctx, &id).await?;
            serde_json::to_value(rec).map_err(ServiceFailure::internal)
        })
    })
}

/// The static operation table. Every route the frontend calls is declared
/// here; nothing is registered dynamically at request time.
pub fn build_registry(state: &AppState) -> Result<Registry, StartupError> {
    let mut registry = Registry::new();

    registry.register(OperationDescriptor {
        name: "list_items",
        method: Method::GET,
        path: "/api/items",
        request_schema: None,
        response_schema: item_list_schema(),
        success_status: StatusCode::OK,
        handler: list_items(state.items.clone()),
    })?;

    registry.register(OperationDescriptor {
        name: "create_item",
        method: Method::POST,
        path: "/api/items",
        request_schema: Some(item_input_schema()?),
        response_schema: item_record_schema(),
        success_status: StatusCode::CREATED,
        handler: create_item(state.items.clone()),
    })?;

    registry.register(OperationDescriptor {
        name: "get_item",
        method: Method::GET,
        path: "/api/items/:id",
        request_schema: None,
        response_schema: item_record_schema(),
        success_status: StatusCode::OK,
        handler: get_item(state.items.clone()),
    })?;

    registry.register(OperationDescriptor {
        name: "delete_item",
        method: Method::DELETE,
        path: "/api/items/:id",
        request_schema: None,
        response_schema: deleted_schema(),
        success_status: StatusCode::OK,
        handler: delete_item(state.items.clone()),
    })?;

    registry.register(OperationDescriptor {
        name: "get_supplier",
        method: Method::GET,
        path: "/api/suppliers/:id",
        request_schema: None,
        response_schema: supplier_schema(),
        success_status: StatusCode::OK,
        handler: get_supplier(state.suppliers.clone()),
    })?;

    Ok(registry)
}

fn build_cors(cors: &CorsConfig) -> Result<CorsLayer, StartupError> {
    let mut origins = Vec::new();
    for origin in &cors.allowed_origins {
        origins.push(HeaderValue::from_str(origin).map_err(|e| {
            StartupError::InvalidConfig(format!("invalid CORS origin {origin:?}: {e}"))
        })?);
    }
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-api-key")])
        .allow_credentials(true))
}

/// Build the full application router: frozen operation registry behind the
/// access middleware, public probe routes, CORS and request tracing.
pub fn build_router(cfg: &AppConfig, state: AppState) -> Result<Router, StartupError> {
    let registry = build_registry(&state)?;
    info!(operations = registry.len(), "operation registry frozen");

    let api = registry
        .into_router(state.clone())?
        .route_layer(middleware::from_fn_with_state(
            state.access.clone(),
            access::require_api_access,
        ));

    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health));

    let cors = build_cors(&cfg.cors)?;

    Ok(public
        .merge(api)
        .fallback(dispatch::route_not_found)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        ))
}
