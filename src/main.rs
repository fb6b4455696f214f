use popqueue::config::load_config;
use popqueue::transport::BrokerServer;
use popqueue::utils::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.logging.level);

    let server = match BrokerServer::start(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Broker failed to start: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Stopping broker.");
        }
        _ = server.shutdown_requested() => {
            error!("Broker is shutting down after a fatal listener error.");
        }
    }

    if let Err(e) = server.stop().await {
        error!("Broker stopped with error: {e}");
        std::process::exit(1);
    }
}
