use anyhow::Result;

use olympus::{config, db::Database, init_logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config()?;

    // Inside the runtime so the remote shipper can start
    let logging = init_logging(&settings.logging)?;
    tracing::info!(
        level = %settings.logging.level,
        remote = settings.logging.remote.is_active(),
        "Logging initialized"
    );

    let result = serve(&settings).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Olympus stopped with an error");
    }

    // The runtime stops with main; ship what is still queued first
    logging.flush().await;
    result
}

async fn serve(settings: &config::Settings) -> Result<()> {
    let db = Database::connect(&settings.database).await?;
    server::start_server(&settings.server, db).await
}
