//! InterConnect Receiver
//!
//! Dials a sender instance and plays the bridged stream on the default
//! output device.

use anyhow::Result;

use interconnect_bridge::{host, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    tracing::info!("Starting InterConnect Receiver");

    let config = host::config_from_args()?;
    tracing::info!("Sender expected at {}", config.dial_target());

    host::run(config, false).await?;
    Ok(())
}
