mod auth;
mod dispatch;
mod error;
mod handlers;
mod setup;
mod state;
mod telemetry;

use clipstream_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration (validated inside from_env; fails fast)
    let config = Config::from_env()?;

    // Initialize the application (database, repositories, queue, routes)
    let (state, router) = setup::initialize_app(config).await?;

    // Start the server
    setup::server::start_server(state, router).await?;

    Ok(())
}
