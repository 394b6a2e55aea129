//! One-shot dump of the issues log, `loom snapshot`.

use anyhow::{Context, Result};

use loom::config::{LoomConfig, Overrides};
use loom::dashboard::{snapshot, watcher};
use loom::logging;

pub async fn cmd_snapshot(overrides: Overrides, pretty: bool) -> Result<()> {
    let config = LoomConfig::resolve(overrides)?;
    logging::init(config.verbose, config.log_format);

    let path = watcher::issues_path(&config.workspace);
    let issues = snapshot::load_issues(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let json = if pretty {
        serde_json::to_string_pretty(&issues)?
    } else {
        serde_json::to_string(&issues)?
    };
    println!("{}", json);
    Ok(())
}
