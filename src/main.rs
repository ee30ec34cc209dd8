//! Gateway entry point: config, Redis, subsystems, serve.

use tokio::net::TcpListener;

use api_gateway::lifecycle::{wait_for_signal, Shutdown};
use api_gateway::{config, observability, HttpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::logging::init("info");

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        bind_address = %config.server.bind_address(),
        services = config.services.len(),
        version = env!("CARGO_PKG_VERSION"),
        "API gateway starting"
    );

    observability::metrics::init();

    // Rate limiting and API keys live in Redis; refuse to start blind.
    let redis_client = redis::Client::open(config.redis.url())?;
    let redis_conn = match redis_client.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            if let Err(e) = redis::cmd("PING").query_async::<()>(&mut conn).await {
                tracing::error!(error = %e, "Failed to connect to Redis");
                std::process::exit(1);
            }
            tracing::info!("Connected to Redis");
            conn
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis");
            std::process::exit(1);
        }
    };

    if config.admin.enabled {
        tracing::info!(username = %config.admin.username, "Admin authentication enabled");
    } else {
        tracing::warn!("Admin authentication is DISABLED - admin endpoints are not protected!");
    }

    tracing::info!(
        max_retries = config.retry.max_retries,
        initial_delay_ms = config.retry.initial_delay_ms,
        max_delay_ms = config.retry.max_delay_ms,
        "Retry configured"
    );

    let bind_address = config.server.bind_address();
    let server = HttpServer::new(config, Some(redis_conn))?;

    let listener = TcpListener::bind(&bind_address).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(wait_for_signal(shutdown));

    server.run(listener, server_shutdown).await?;

    tracing::info!("Server exited");
    Ok(())
}
