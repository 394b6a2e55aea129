use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use loom::config::Overrides;
use loom::logging::LogFormat;

mod cmd;

#[derive(Parser)]
#[command(name = "loom")]
#[command(version, about = "Live web dashboard for bd issue trackers")]
pub struct Cli {
    /// Workspace containing the `.beads` directory (defaults to the current directory)
    #[arg(short, long, global = true, env = "WORKSPACE_PATH")]
    pub workspace: Option<PathBuf>,

    /// Port to serve on
    #[arg(short, long, global = true, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, global = true, env = "LOOM_HOST")]
    pub host: Option<String>,

    /// Command used to invoke bd; may include leading arguments
    #[arg(long, global = true, env = "BD_CMD")]
    pub bd_cmd: Option<String>,

    /// Seconds before a bd invocation is killed
    #[arg(long, global = true, env = "LOOM_COMMAND_TIMEOUT_SECS")]
    pub command_timeout_secs: Option<u64>,

    /// Log output: pretty or json
    #[arg(long, global = true, env = "LOOM_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable dev mode (permissive CORS, bind all interfaces)
    #[arg(long, global = true)]
    pub dev: bool,

    /// Open the dashboard in a browser once the server is up
    #[arg(long, global = true)]
    pub open: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the dashboard (default)
    Serve,
    /// Print the current issues log as a JSON array
    Snapshot {
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            workspace: self.workspace.clone(),
            port: self.port,
            host: self.host.clone(),
            bd_cmd: self.bd_cmd.clone(),
            command_timeout_secs: self.command_timeout_secs,
            log_format: self.log_format,
            verbose: self.verbose,
            dev: self.dev,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match &cli.command {
        None | Some(Commands::Serve) => cmd::cmd_serve(cli.overrides(), cli.open).await?,
        Some(Commands::Snapshot { pretty }) => cmd::cmd_snapshot(cli.overrides(), *pretty).await?,
    }

    Ok(())
}
