//! Fairsale server.
//!
//! Serves the waiting-room and order API and runs the periodic tasks (queue processor,
//! slot reaper, order reaper).
//!
//! # Usage
//!
//! ```bash
//! # Start PostgreSQL and Redis
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin server
//! ```

use ticketing::{ApplicationBuilder, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    ApplicationBuilder::new()
        .with_config(config)
        .with_tracing()?
        .with_metrics()?
        .with_resources()
        .await?
        .build()
        .await?
        .run()
        .await
}
