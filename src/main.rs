use deploy_hook::error::HookError;
use deploy_hook::invalidate::{CacheInvalidator, CloudFrontClient, EnvCredentials};
use deploy_hook::logging::{FileLogger, setup_logging};
use deploy_hook::{AppState, HookConfig, build_router, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{self, info};

const DEFAULT_CONFIG_PATH: &str = "deploy_hook.toml";

async fn run(config: HookConfig) -> Result<(), HookError> {
    let client = CloudFrontClient::from_env().await;
    let invalidator =
        CacheInvalidator::from_config(&config.cdn, Arc::new(EnvCredentials), Arc::new(client));
    info!(
        "CDN distributions to invalidate: {:?}",
        invalidator
            .targets()
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
    );

    let bind_address = config.bind_address();
    let state = Arc::new(AppState::new(config, invalidator));
    let app = build_router(state);

    info!("serving on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address.as_str()).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path = std::env::var("HOOK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let file_logger = config.log_dir.clone().map(FileLogger::new);
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Using config at {:?}", config_path);
    if let Err(e) = run(config).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
