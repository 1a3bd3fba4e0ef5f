use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: &'static str,
}

/// Root banner returned on `GET /` so the frontend can probe the backend.
#[derive(Serialize, Deserialize, Debug)]
pub struct ServiceBanner {
    pub service: &'static str,
    pub version: &'static str,
}
