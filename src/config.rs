//! Layered runtime configuration.
//!
//! Precedence, lowest first: built-in defaults, `<workspace>/loom.toml`,
//! environment, command-line flags. The environment and flag layers both
//! arrive through [`Overrides`], since clap reads the env vars for each flag.
//!
//! ```toml
//! port = 3000
//! host = "127.0.0.1"
//! bd_cmd = "bd --no-daemon"
//! command_timeout_secs = 30
//! log_format = "json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dashboard::bd;
use crate::dashboard::server::ServerConfig;
use crate::logging::LogFormat;

pub const CONFIG_FILE: &str = "loom.toml";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEV_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BD_CMD: &str = "bd";

/// Contents of `loom.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoomToml {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub bd_cmd: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub log_format: Option<LogFormat>,
}

impl LoomToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse loom.toml")
    }

    /// Returns the default (empty) file when `loom.toml` does not exist.
    pub fn load_or_default(workspace: &Path) -> Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Values supplied by flags or environment variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workspace: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub bd_cmd: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub log_format: Option<LogFormat>,
    pub verbose: bool,
    pub dev: bool,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoomConfig {
    pub workspace: PathBuf,
    pub host: String,
    pub port: u16,
    pub bd_cmd: String,
    pub command_timeout: Duration,
    pub log_format: LogFormat,
    pub verbose: bool,
    pub dev_mode: bool,
}

impl LoomConfig {
    /// Resolve every layer. The workspace defaults to the current directory
    /// and must exist.
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let workspace = match overrides.workspace {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace: {}", workspace.display()))?;
        let file = LoomToml::load_or_default(&workspace)?;

        let default_host = if overrides.dev { DEV_HOST } else { DEFAULT_HOST };
        let timeout_secs = overrides
            .command_timeout_secs
            .or(file.command_timeout_secs);
        if timeout_secs == Some(0) {
            anyhow::bail!("command_timeout_secs must be greater than zero");
        }

        Ok(Self {
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| default_host.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            bd_cmd: overrides
                .bd_cmd
                .or(file.bd_cmd)
                .unwrap_or_else(|| DEFAULT_BD_CMD.to_string()),
            command_timeout: timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(bd::DEFAULT_TIMEOUT),
            log_format: overrides.log_format.or(file.log_format).unwrap_or_default(),
            verbose: overrides.verbose,
            dev_mode: overrides.dev,
            workspace,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            workspace: self.workspace.clone(),
            bd_cmd: self.bd_cmd.clone(),
            command_timeout: self.command_timeout,
            dev_mode: self.dev_mode,
        }
    }

    /// Address a browser on this machine should open.
    pub fn browser_url(&self) -> String {
        let host = match self.host.as_str() {
            DEV_HOST | "::" => "localhost",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}
