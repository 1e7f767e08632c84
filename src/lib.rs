pub mod api;
pub mod error;
pub mod invalidate;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod runner;
pub mod signature;
pub mod webhook;

use axum::{Router, routing};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::HookError;
use crate::invalidate::CacheInvalidator;
use crate::webhook::DEFAULT_DEPLOY_REF;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SECRET: &str = "123";
pub const DEFAULT_SCRIPT: &str = "./run.sh";
pub const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct HookConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub script: PathBuf,
    pub shell: PathBuf,
    pub deploy_ref: String,
    pub cdn: CdnConfig,
    pub log_dir: Option<PathBuf>,
}

/// CloudFront distributions purged after a deployment
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CdnConfig {
    pub book_distribution_id: Option<String>,
    pub docs_distribution_id: Option<String>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            secret: DEFAULT_SECRET.to_string(),
            script: PathBuf::from(DEFAULT_SCRIPT),
            shell: PathBuf::from(DEFAULT_SHELL),
            deploy_ref: DEFAULT_DEPLOY_REF.to_string(),
            cdn: CdnConfig::default(),
            log_dir: None,
        }
    }
}

// Keeps the webhook secret out of logs
impl fmt::Debug for HookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &"<redacted>")
            .field("script", &self.script)
            .field("shell", &self.shell)
            .field("deploy_ref", &self.deploy_ref)
            .field("cdn", &self.cdn)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl HookConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self, HookError> {
        let mut config: HookConfig = toml::from_str(content)?;
        config.cdn.book_distribution_id = config.cdn.book_distribution_id.and_then(non_empty);
        config.cdn.docs_distribution_id = config.cdn.docs_distribution_id.and_then(non_empty);
        Ok(config)
    }

    /// Apply overrides from variables resolved through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), HookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| HookError::ConfigError(format!("invalid PORT '{}': {}", port, e)))?;
        }
        if let Some(secret) = lookup("SECRET") {
            self.secret = secret;
        }
        if let Some(script) = lookup("SCRIPT") {
            self.script = PathBuf::from(script);
        }
        if let Some(shell) = lookup("SHELL_PATH") {
            self.shell = PathBuf::from(shell);
        }
        if let Some(deploy_ref) = lookup("DEPLOY_REF") {
            self.deploy_ref = deploy_ref;
        }
        if let Some(id) = lookup("BOOK_CDN_DIST_ID") {
            self.cdn.book_distribution_id = non_empty(id);
        }
        if let Some(id) = lookup("DOCS_CDN_DIST_ID") {
            self.cdn.docs_distribution_id = non_empty(id);
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log_dir = non_empty(dir).map(PathBuf::from);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }
}

/// Load the configuration file at `path` (defaults when it doesn't exist),
/// then apply overrides from the process environment.
pub fn load_config(path: &Path) -> Result<HookConfig, HookError> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        HookConfig::from_toml(&content).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?
    } else {
        HookConfig::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

pub struct AppState {
    pub config: HookConfig,
    pub invalidator: Arc<CacheInvalidator>,
}

impl AppState {
    pub fn new(config: HookConfig, invalidator: CacheInvalidator) -> Self {
        Self {
            config,
            invalidator: Arc::new(invalidator),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Routes of the hook server
pub fn build_router(state: SharedState) -> Router {
    if state.config.uses_default_secret() {
        warn!("Using the default webhook secret, set SECRET in production");
    }
    info!("using script {}", state.config.script.display());

    Router::new()
        .route("/", routing::post(api::handle_webhook))
        .route("/health", routing::get(api::health))
        .fallback(api::not_found)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
