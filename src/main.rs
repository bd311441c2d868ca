use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use filedrop::{Config, DropService, WebServer};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = filedrop::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        filedrop::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    info!("filedrop - anonymous file drop");

    let service = match DropService::new(&config.storage) {
        Ok(service) => service.with_base_url(config.share.base_url.clone()),
        Err(e) => {
            error!("Failed to open upload directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    match service.cleanup() {
        Ok(report) if !report.is_empty() => info!(
            expired = report.expired.len(),
            dangling = report.dangling.len(),
            orphans = report.orphans.len(),
            "Startup cleanup finished"
        ),
        Ok(_) => {}
        Err(e) => error!("Startup cleanup failed: {e}"),
    }

    let server = match WebServer::new(&config.web, Arc::new(service)) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
