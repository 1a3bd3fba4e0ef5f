use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

/// Process-wide configuration. Loaded once at startup, immutable afterwards.
/// Unknown keys anywhere in the file are rejected so a typo never degrades
/// into a silent default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub access: AccessConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_day: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            rate_limit_per_day: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    #[serde(default)]
    pub api_access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub supplier_base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retry_enabled")]
    pub retry_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

fn default_request_timeout() -> u64 { 30 }
fn default_rate_limit() -> u32 { 200 }
fn default_connect_timeout() -> u64 { 5 }
fn default_retry_enabled() -> bool { true }
fn default_data_dir() -> String { "data".to_string() }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("cannot read config file {path}: {e}"))?;
    let cfg: AppConfig = toml::from_str(&content)
        .map_err(|e| anyhow!("malformed config file {path}: {e}"))?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.validate()?;
        self.cors.validate()?;
        self.limits.validate()?;
        self.access.normalize_from_env();
        self.access.validate()?;
        self.upstream.normalize_from_env();
        self.upstream.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("server.host must not be empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        if let Some(w) = self.worker_threads {
            if w == 0 {
                return Err(anyhow!("server.worker_threads must be >= 1 when set"));
            }
        }
        Ok(())
    }
}

impl CorsConfig {
    fn validate(&self) -> Result<()> {
        for origin in &self.allowed_origins {
            let lower = origin.to_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                return Err(anyhow!(
                    "cors.allowed_origins entry {origin:?} must start with http:// or https://"
                ));
            }
        }
        Ok(())
    }
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("limits.request_timeout_secs must be a positive number of seconds"));
        }
        if self.rate_limit_per_day == 0 {
            return Err(anyhow!("limits.rate_limit_per_day must be >= 1"));
        }
        Ok(())
    }
}

impl AccessConfig {
    // Token may come from the environment instead of the file so it stays
    // out of version control.
    pub fn normalize_from_env(&mut self) {
        if self.api_access_token.is_none() {
            if let Ok(token) = std::env::var("API_ACCESS_TOKEN") {
                if !token.trim().is_empty() {
                    self.api_access_token = Some(token);
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(token) = &self.api_access_token {
            if token.trim().is_empty() {
                return Err(anyhow!("access.api_access_token must not be blank when set"));
            }
        }
        Ok(())
    }
}

impl UpstreamConfig {
    pub fn normalize_from_env(&mut self) {
        if self.supplier_base_url.trim().is_empty() {
            if let Ok(url) = std::env::var("SUPPLIER_BASE_URL") {
                self.supplier_base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.supplier_base_url.trim().is_empty() {
            return Err(anyhow!(
                "upstream.supplier_base_url is missing; provide it in config.toml or via SUPPLIER_BASE_URL"
            ));
        }
        let lower = self.supplier_base_url.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(anyhow!("upstream.supplier_base_url must start with http:// or https://"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(anyhow!("upstream.connect_timeout_secs must be a positive number of seconds"));
        }
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        Ok(())
    }
}
