// src/main.rs
use env_logger::Builder;
use log::{error, info, LevelFilter};
use stockfolio::api::{self, AppContext};
use stockfolio::auth::Authenticator;
use stockfolio::config::Config;
use stockfolio::db;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = Config::from_env()?;
    let store = match db::connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize store: {}", e);
            return Err(e.into());
        }
    };
    info!("Connected to store...");

    let ctx = AppContext::new(store.clone(), Authenticator::from_config(&config));
    let (addr, server) = warp::serve(api::routes(ctx)).try_bind_with_graceful_shutdown(
        config.socket_addr(),
        async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received.");
        },
    )?;

    info!("Server running on http://{}", addr);
    server.await;

    store.close().await?;
    info!("Store closed. Bye.");
    Ok(())
}
