use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use reqwest::StatusCode as HttpStatusCode;
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use configs::{
    AccessConfig, AppConfig, CorsConfig, LimitsConfig, ServerConfig, StorageConfig, UpstreamConfig,
};
use schema::{FieldSpec, ObjectSchema, StringSchema};
use server::registry::{OperationDescriptor, Registry};

fn test_config(supplier_base_url: String) -> AppConfig {
    AppConfig {
        server: ServerConfig { host: "127.0.0.1".into(), port: 0, worker_threads: None },
        cors: CorsConfig { allowed_origins: vec!["http://localhost:5173".into()] },
        limits: LimitsConfig { request_timeout_secs: 30, rate_limit_per_day: 10_000 },
        access: AccessConfig { api_access_token: None },
        upstream: UpstreamConfig {
            supplier_base_url,
            connect_timeout_secs: 2,
            retry_enabled: false,
        },
        // Isolated per-run data dir so parallel tests never share state.
        storage: StorageConfig { data_dir: format!("target/test-data/{}", Uuid::new_v4()) },
    }
}

/// Stub supplier directory standing in for the real upstream.
async fn stub_supplier(Path(id): Path<String>, State(delay): State<Option<Duration>>) -> Response {
    if let Some(d) = delay {
        tokio::time::sleep(d).await;
    }
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "no such supplier"}))).into_response();
    }
    Json(json!({"supplier_id": id, "name": "Acme Components", "status": "active"})).into_response()
}

async fn start_stub_upstream(delay: Option<Duration>) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/suppliers/:id", get(stub_supplier))
        .with_state(delay);
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("stub upstream error: {e}");
        }
    });
    Ok(format!("http://{}:{}", addr.ip(), addr.port()))
}

async fn start_app(cfg: AppConfig) -> anyhow::Result<String> {
    let state = server::startup::build_state(&cfg).await?;
    let app = server::routes::build_router(&cfg, state)?;
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            eprintln!("server error: {e}");
        }
    });
    Ok(format!("http://{}:{}", addr.ip(), addr.port()))
}

async fn start_default_app() -> anyhow::Result<String> {
    let upstream = start_stub_upstream(None).await?;
    start_app(test_config(upstream)).await
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn public_probe_routes() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let res = client().get(format!("{base}/health")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["status"], "ok");

    let res = client().get(format!("{base}/")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["service"], "purchasing-backend");
    Ok(())
}

#[tokio::test]
async fn item_crud_roundtrip() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let c = client();

    let res = c
        .post(format!("{base}/api/items"))
        .json(&json!({
            "item_code": "100004",
            "item_name": "Widget",
            "risk_level": "High",
            "current_stock": 120.0,
            "wks_to_oos": 3.5,
        }))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::CREATED);
    let created = res.json::<serde_json::Value>().await?;
    let id = created["id"].as_str().expect("id present").to_string();
    assert_eq!(created["item_code"], "100004");
    assert!(created["created_at"].as_str().is_some());

    let res = c.get(format!("{base}/api/items")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let list = res.json::<serde_json::Value>().await?;
    assert_eq!(list["items"].as_array().expect("items array").len(), 1);

    let res = c.get(format!("{base}/api/items/{id}")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let fetched = res.json::<serde_json::Value>().await?;
    assert_eq!(fetched["item_name"], "Widget");

    let res = c.delete(format!("{base}/api/items/{id}")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let deleted = res.json::<serde_json::Value>().await?;
    assert_eq!(deleted["deleted"], true);

    let res = c.get(format!("{base}/api/items/{id}")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::NOT_FOUND);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "NotFound");
    Ok(())
}

#[tokio::test]
async fn empty_item_name_is_rejected_before_the_service_runs() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let c = client();

    let res = c
        .post(format!("{base}/api/items"))
        .json(&json!({"item_code": "100004", "item_name": ""}))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "ValidationFailure");
    let details = err["details"].as_array().expect("details array");
    assert!(details
        .iter()
        .any(|d| d["field"] == "item_name" && d["code"] == "empty-value"));

    // The store must not have been touched.
    let res = c.get(format!("{base}/api/items")).send().await?;
    let list = res.json::<serde_json::Value>().await?;
    assert!(list["items"].as_array().expect("items array").is_empty());
    Ok(())
}

#[tokio::test]
async fn every_violation_is_reported_at_once() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let res = client()
        .post(format!("{base}/api/items"))
        .json(&json!({"item_name": "", "risk_level": "catastrophic", "current_stock": -1}))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);
    let err = res.json::<serde_json::Value>().await?;
    let details = err["details"].as_array().expect("details array");
    assert!(details.iter().any(|d| d["field"] == "item_code" && d["code"] == "missing"));
    assert!(details.iter().any(|d| d["field"] == "item_name"));
    assert!(details.iter().any(|d| d["field"] == "risk_level"));
    assert!(details.iter().any(|d| d["field"] == "current_stock"));
    Ok(())
}

#[tokio::test]
async fn malformed_json_body_is_a_validation_failure() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let res = client()
        .post(format!("{base}/api/items"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "ValidationFailure");
    assert_eq!(err["details"][0]["field"], "(body)");
    Ok(())
}

#[tokio::test]
async fn unregistered_route_yields_not_found_shape() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let res = client().get(format!("{base}/api/nope")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::NOT_FOUND);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "NotFound");
    Ok(())
}

#[tokio::test]
async fn non_uuid_item_id_is_a_validation_failure() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let res = client().get(format!("{base}/api/items/42")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::BAD_REQUEST);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "ValidationFailure");
    Ok(())
}

#[tokio::test]
async fn supplier_lookup_passes_through_the_directory() -> anyhow::Result<()> {
    let base = start_default_app().await?;
    let res = client().get(format!("{base}/api/suppliers/sup-7")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["supplier_id"], "sup-7");
    assert_eq!(body["name"], "Acme Components");

    let res = client().get(format!("{base}/api/suppliers/missing")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::NOT_FOUND);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "NotFound");
    Ok(())
}

#[tokio::test]
async fn slow_upstream_becomes_a_retryable_dependency_failure() -> anyhow::Result<()> {
    let upstream = start_stub_upstream(Some(Duration::from_secs(3))).await?;
    let mut cfg = test_config(upstream);
    cfg.limits.request_timeout_secs = 1;
    let base = start_app(cfg).await?;

    let res = client().get(format!("{base}/api/suppliers/sup-1")).send().await?;
    assert!(res.status().is_server_error());
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "UpstreamDependencyFailure");
    assert_eq!(err["retryable"], true);
    Ok(())
}

#[tokio::test]
async fn access_token_guards_api_routes_only() -> anyhow::Result<()> {
    let upstream = start_stub_upstream(None).await?;
    let mut cfg = test_config(upstream);
    cfg.access.api_access_token = Some("test-secret".into());
    let base = start_app(cfg).await?;
    let c = client();

    // Public probes stay open.
    let res = c.get(format!("{base}/health")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);

    let res = c.get(format!("{base}/api/items")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::FORBIDDEN);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "AccessDenied");

    let res = c
        .get(format!("{base}/api/items"))
        .header("X-API-Key", "wrong")
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::FORBIDDEN);

    let res = c
        .get(format!("{base}/api/items"))
        .header("X-API-Key", "test-secret")
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn daily_rate_limit_returns_429() -> anyhow::Result<()> {
    let upstream = start_stub_upstream(None).await?;
    let mut cfg = test_config(upstream);
    cfg.limits.rate_limit_per_day = 3;
    let base = start_app(cfg).await?;
    let c = client();

    for _ in 0..3 {
        let res = c.get(format!("{base}/api/items")).send().await?;
        assert_eq!(res.status(), HttpStatusCode::OK);
    }
    let res = c.get(format!("{base}/api/items")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::TOO_MANY_REQUESTS);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "RateLimited");
    Ok(())
}

#[tokio::test]
async fn response_contract_violation_surfaces_as_internal_fault() -> anyhow::Result<()> {
    let upstream = start_stub_upstream(None).await?;
    let cfg = test_config(upstream);
    let state = server::startup::build_state(&cfg).await?;

    let mut registry = Registry::new();
    registry
        .register(OperationDescriptor {
            name: "broken_op",
            method: Method::GET,
            path: "/api/broken",
            request_schema: None,
            response_schema: ObjectSchema::new()
                .field(FieldSpec::required("value", StringSchema::new().non_empty().build()))
                .build(),
            success_status: StatusCode::OK,
            handler: Arc::new(|_ctx, _input| {
                Box::pin(async { Ok(json!({"unexpected": 1})) })
            }),
        })
        .expect("register");
    let app = registry.into_router(state)?;

    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let res = client()
        .get(format!("http://{}:{}/api/broken", addr.ip(), addr.port()))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::INTERNAL_SERVER_ERROR);
    let err = res.json::<serde_json::Value>().await?;
    assert_eq!(err["kind"], "InternalFault");
    // The contract details stay in the log, never on the wire.
    assert_eq!(err["message"], "internal fault");
    Ok(())
}
