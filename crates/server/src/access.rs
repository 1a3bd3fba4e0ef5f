//! Access control for the `/api` surface: an optional shared access token
//! plus a per-IP daily usage ceiling. Public probe routes bypass this layer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;

use crate::errors::ApiError;

/// Caller identity resolved by the middleware, threaded into the request
/// `Context` by the dispatch layer.
#[derive(Clone, Debug)]
pub struct Caller(pub String);

pub struct AccessState {
    token: Option<String>,
    daily_limit: u32,
    // (client ip, day) -> requests served
    usage: DashMap<(String, NaiveDate), u32>,
}

impl AccessState {
    pub fn new(token: Option<String>, daily_limit: u32) -> Arc<Self> {
        Arc::new(Self { token, daily_limit, usage: DashMap::new() })
    }

    pub fn token_required(&self) -> bool {
        self.token.is_some()
    }

    fn verify_token(&self, provided: Option<&str>) -> Result<(), ApiError> {
        match &self.token {
            None => Ok(()),
            Some(expected) if provided == Some(expected.as_str()) => Ok(()),
            Some(_) => Err(ApiError::access_denied("invalid API access token")),
        }
    }

    fn count_request(&self, client_ip: &str) -> Result<(), ApiError> {
        let today = Utc::now().date_naive();
        let mut entry = self.usage.entry((client_ip.to_string(), today)).or_insert(0);
        if *entry >= self.daily_limit {
            return Err(ApiError::rate_limited(self.daily_limit));
        }
        *entry += 1;
        Ok(())
    }
}

pub async fn require_api_access(
    State(access): State<Arc<AccessState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    access.verify_token(provided.as_deref())?;
    if access.token_required() {
        req.extensions_mut().insert(Caller("api-key".to_string()));
    }

    let client_ip = connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    access.count_request(&client_ip)?;

    Ok(next.run(req).await)
}
