use anyhow::Result;
use evlink::config::Config;
use evlink::hub::Hub;
use evlink::logging::{get_logger, init_logging};
use evlink::notify::NotificationCenter;
use evlink::setup::HttpAccountProbe;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_SAVE_PATH: &str = "evlink_config.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::resolve_path().map(PathBuf::from);
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let logger = get_logger("main");
    logger.info(&format!(
        "EVLink {} starting up (config: {})",
        env!("APP_VERSION"),
        config_path
            .as_ref()
            .map_or_else(|| "defaults".to_string(), |p| p.display().to_string())
    ));

    let notifications = Arc::new(NotificationCenter::new(config.notifications.max_retained));
    let probe = Arc::new(HttpAccountProbe::new(config.clone(), notifications.clone()));
    let (host, port) = (config.web.host.clone(), config.web.port);
    let save_path = config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_PATH));
    let hub = Arc::new(Hub::new(config, Some(save_path), notifications, probe));

    if hub.start().await {
        logger.info("Entry active");
    }

    #[cfg(feature = "web")]
    evlink::web::serve(hub.clone(), &host, port).await?;

    #[cfg(not(feature = "web"))]
    {
        let _ = (host, port);
        tokio::signal::ctrl_c().await?;
    }

    hub.unload().await;
    logger.info("Shutdown complete");
    Ok(())
}
