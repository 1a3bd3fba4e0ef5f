use std::time::Duration;

use uuid::Uuid;

/// Request-scoped, read-only data handed to every service operation.
/// Built by the dispatch layer per request; services never reach for
/// process globals.
#[derive(Clone, Debug)]
pub struct Context {
    pub request_id: Uuid,
    /// Caller identity when access control resolved one (API key name).
    pub caller: Option<String>,
    /// Budget for the whole service invocation, including upstream calls.
    pub deadline: Duration,
}

impl Context {
    pub fn new(deadline: Duration) -> Self {
        Self { request_id: Uuid::new_v4(), caller: None, deadline }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}
