//! Show the effective configuration.

use anyhow::{Context, Result};
use collab_client::ClientConfig;

/// Run the config command.
pub fn run(config: &ClientConfig) -> Result<()> {
    let text = config.to_toml().context("Failed to render configuration")?;
    print!("{text}");
    Ok(())
}
