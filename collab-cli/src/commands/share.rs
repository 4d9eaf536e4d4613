//! Print a session's join link.

use anyhow::{Context, Result};
use collab_client::ClientConfig;
use collab_types::SessionId;

/// Run the share command.
pub fn run(config: &ClientConfig, session_id: &SessionId) -> Result<()> {
    let link = config
        .share_link(session_id)
        .context("Failed to build share link")?;
    println!("{link}");
    Ok(())
}
