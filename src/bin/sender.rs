//! InterConnect Sender
//!
//! Captures the default input device and streams it to a receiver instance
//! over the loopback bridge.

use anyhow::Result;

use interconnect_bridge::{host, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    tracing::info!("Starting InterConnect Sender");

    let config = host::config_from_args()?;
    tracing::info!("Listening on 127.0.0.1:{}", config.port);

    host::run(config, true).await?;
    Ok(())
}
