//! Shared fixtures for binary and end-to-end tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use loom::dashboard::server::{self, ServerConfig};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Stand-in for the bd CLI. Reads and appends `.beads/issues.jsonl` in the
/// working directory.
pub const FAKE_BD: &str = include_str!("../fixtures/fake_bd.sh");

pub fn create_test_script(dir: &Path, name: &str, content: &str) -> PathBuf {
    let script_path = dir.join(name);
    std::fs::write(&script_path, content).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).unwrap();
    }
    script_path
}

/// A workspace with a `.beads` directory and a fake bd next to it.
pub struct Workspace {
    pub dir: TempDir,
    pub bin: TempDir,
    pub bd: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".beads")).unwrap();
        let bin = TempDir::new().unwrap();
        let bd = create_test_script(bin.path(), "bd", FAKE_BD);
        Self { dir, bin, bd }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join(".beads/issues.jsonl")
    }

    pub fn seed(&self, lines: &[&str]) {
        std::fs::write(self.log_path(), lines.join("\n") + "\n").unwrap();
    }
}

/// A server running in the background on an ephemeral port.
pub struct RunningServer {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    pub async fn start(workspace: &Workspace) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            workspace: workspace.path().to_path_buf(),
            bd_cmd: workspace.bd.to_string_lossy().into_owned(),
            command_timeout: Duration::from_secs(10),
            ..ServerConfig::default()
        };
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server::serve(listener, config, async {
            let _ = rx.await;
        }));
        Self {
            base_url: format!("http://{}", addr),
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}
