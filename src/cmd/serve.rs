//! Dashboard server command, `loom serve`.

use anyhow::Result;
use tracing::warn;

use loom::config::{LoomConfig, Overrides};
use loom::dashboard::server;
use loom::logging;

pub async fn cmd_serve(overrides: Overrides, open: bool) -> Result<()> {
    let config = LoomConfig::resolve(overrides)?;
    logging::init(config.verbose, config.log_format);

    // No browser inside dev containers.
    if open && !config.dev_mode {
        let url = config.browser_url();
        tokio::spawn(async move {
            // Give the listener a moment to bind.
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                warn!(url, error = %e, "Failed to open browser");
            }
        });
    }

    server::start_server(config.server_config()).await
}
