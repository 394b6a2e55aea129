//! Adapter over the external `bd` command.
//!
//! Every operation spawns one `bd <subcommand> ... --json` process in the
//! workspace directory and parses its stdout. Processes are started from an
//! argument vector, never through a shell. User-supplied text is passed as
//! `--flag=value`, and the create title sits behind a `--` terminator.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::models::{CreateIssueRequest, DependencyTreeNode, Issue, UpdateIssueRequest};
use crate::errors::BdError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static ISSUE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct BdCli {
    workspace: PathBuf,
    program: String,
    /// Leading arguments from a multi-word command such as `npx bd`.
    prefix: Vec<String>,
    timeout: Duration,
}

impl BdCli {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            program: "bd".to_string(),
            prefix: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different command line to invoke bd. The string is split with
    /// shell word rules but never run through a shell.
    pub fn with_command(mut self, command: &str) -> Result<Self, BdError> {
        let mut words = shlex::split(command)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| BdError::InvalidArgument(format!("Invalid bd command: {command:?}")))?
            .into_iter();
        self.program = words
            .next()
            .ok_or_else(|| BdError::InvalidArgument("bd command is empty".to_string()))?;
        self.prefix = words.collect();
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub async fn list_issues(&self) -> Result<Vec<Issue>, BdError> {
        self.run_list(&["list", "--json"]).await
    }

    /// `bd show` answers with either an object or a one-element array.
    pub async fn get_issue(&self, id: &str) -> Result<Issue, BdError> {
        validate_issue_id(id)?;
        let args = args(&["show", id, "--json"]);
        let stdout = self.run(&args).await?;
        first_issue(&self.render(&args), &stdout)?.ok_or_else(|| BdError::NotFound {
            id: id.to_string(),
        })
    }

    pub async fn create_issue(&self, request: &CreateIssueRequest) -> Result<Issue, BdError> {
        let args = create_args(request)?;
        self.run_single(&args).await
    }

    pub async fn update_issue(&self, request: &UpdateIssueRequest) -> Result<Issue, BdError> {
        let args = update_args(request)?;
        self.run_single(&args).await
    }

    pub async fn close_issue(&self, id: &str, reason: Option<&str>) -> Result<Issue, BdError> {
        let args = close_args(id, reason)?;
        self.run_single(&args).await
    }

    pub async fn ready_issues(&self) -> Result<Vec<Issue>, BdError> {
        self.run_list(&["ready", "--json"]).await
    }

    pub async fn blocked_issues(&self) -> Result<Vec<Issue>, BdError> {
        self.run_list(&["blocked", "--json"]).await
    }

    pub async fn dependency_tree(&self, id: &str) -> Result<Vec<DependencyTreeNode>, BdError> {
        validate_issue_id(id)?;
        self.run_list(&["dep", "tree", id, "--json"]).await
    }

    async fn run_list<T: DeserializeOwned>(&self, argv: &[&str]) -> Result<Vec<T>, BdError> {
        let args = args(argv);
        let stdout = self.run(&args).await?;
        if stdout.is_empty() {
            return Ok(Vec::new());
        }
        parse(&self.render(&args), &stdout)
    }

    async fn run_single(&self, args: &[String]) -> Result<Issue, BdError> {
        let stdout = self.run(args).await?;
        let command = self.render(args);
        first_issue(&command, &stdout)?.ok_or(BdError::EmptyResponse { command })
    }

    /// Run bd with `args` and return its trimmed stdout.
    async fn run(&self, args: &[String]) -> Result<String, BdError> {
        let command = self.render(args);
        debug!(command = %command, cwd = %self.workspace.display(), "Running bd");

        let child = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BdError::SpawnFailed {
                command: command.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| BdError::SpawnFailed {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "bd timed out");
                return Err(BdError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(BdError::NonZeroExit {
                command,
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            warn!(command = %command, stderr = %stderr, "bd stderr");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn render(&self, args: &[String]) -> String {
        let words = std::iter::once(self.program.as_str())
            .chain(self.prefix.iter().map(String::as_str))
            .chain(args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

fn args(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|a| a.to_string()).collect()
}

fn parse<T: DeserializeOwned>(command: &str, stdout: &str) -> Result<T, BdError> {
    serde_json::from_str(stdout).map_err(|source| BdError::Parse {
        command: command.to_string(),
        source,
    })
}

/// Accept a single issue object or an array; `None` for an empty array.
fn first_issue(command: &str, stdout: &str) -> Result<Option<Issue>, BdError> {
    let value: serde_json::Value = parse(command, stdout)?;
    let value = match value {
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return Ok(None),
        },
        other => other,
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| BdError::Parse {
            command: command.to_string(),
            source,
        })
}

// ── Argument construction ─────────────────────────────────────────────

pub fn validate_issue_id(id: &str) -> Result<(), BdError> {
    if ISSUE_ID.is_match(id) {
        Ok(())
    } else {
        Err(BdError::InvalidArgument(format!("Invalid issue id: {id:?}")))
    }
}

fn validate_text(field: &str, value: &str) -> Result<(), BdError> {
    if value.contains('\0') {
        return Err(BdError::InvalidArgument(format!(
            "{field} must not contain NUL bytes"
        )));
    }
    Ok(())
}

fn flag(name: &str, value: &str) -> Result<String, BdError> {
    validate_text(name, value)?;
    Ok(format!("--{name}={value}"))
}

pub fn create_args(request: &CreateIssueRequest) -> Result<Vec<String>, BdError> {
    if request.title.trim().is_empty() {
        return Err(BdError::InvalidArgument("title is required".to_string()));
    }
    validate_text("title", &request.title)?;

    let mut args = args(&["create", "--json"]);
    if let Some(description) = &request.description {
        args.push(flag("description", description)?);
    }
    if let Some(priority) = request.priority {
        args.push(format!("--priority={priority}"));
    }
    if let Some(issue_type) = &request.issue_type {
        args.push(flag("type", issue_type.as_str())?);
    }
    if let Some(labels) = request.labels.as_deref().filter(|l| !l.is_empty()) {
        for label in labels {
            if label.trim().is_empty() || label.contains(',') {
                return Err(BdError::InvalidArgument(format!("Invalid label: {label:?}")));
            }
        }
        args.push(flag("labels", &labels.join(","))?);
    }
    args.push("--".to_string());
    args.push(request.title.clone());
    Ok(args)
}

pub fn update_args(request: &UpdateIssueRequest) -> Result<Vec<String>, BdError> {
    validate_issue_id(&request.id)?;

    let mut args = args(&["update", &request.id, "--json"]);
    if let Some(title) = &request.title {
        if title.trim().is_empty() {
            return Err(BdError::InvalidArgument("title must not be empty".to_string()));
        }
        args.push(flag("title", title)?);
    }
    if let Some(description) = &request.description {
        args.push(flag("description", description)?);
    }
    if let Some(status) = &request.status {
        args.push(flag("status", status.as_str())?);
    }
    if let Some(priority) = request.priority {
        args.push(format!("--priority={priority}"));
    }
    if let Some(assignee) = &request.assignee {
        args.push(flag("assignee", assignee)?);
    }
    Ok(args)
}

pub fn close_args(id: &str, reason: Option<&str>) -> Result<Vec<String>, BdError> {
    validate_issue_id(id)?;

    let mut args = args(&["close", id, "--json"]);
    if let Some(reason) = reason.filter(|r| !r.is_empty()) {
        args.push(flag("reason", reason)?);
    }
    Ok(args)
}
