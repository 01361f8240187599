//! Shell-level git operations.
//!
//! Source fetch and update run through the system `git` binary rather than
//! an in-process implementation; every invocation is cancellable and the
//! child is killed on cancel instead of being orphaned.

use crate::cancel::CancellationToken;
use crate::{HangarError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Callback invoked for each line of git output.
pub type OutputCallback<'a> = Option<&'a (dyn Fn(&str) + Send + Sync)>;

/// Runs git commands against package checkouts.
#[derive(Debug, Clone, Default)]
pub struct GitRunner {
    /// Override for the git executable path (defaults to `git` on PATH).
    git_path: Option<PathBuf>,
}

impl GitRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable instead of the one on PATH.
    pub fn with_git_path(git_path: impl Into<PathBuf>) -> Self {
        Self {
            git_path: Some(git_path.into()),
        }
    }

    /// Check whether git is available.
    pub async fn is_available(&self) -> bool {
        Command::new(self.executable())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Clone a repository, optionally at a specific branch or tag.
    pub async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        branch_or_tag: Option<&str>,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut args: Vec<String> = vec!["clone".into()];
        if let Some(r) = branch_or_tag {
            args.push("--branch".into());
            args.push(r.into());
        }
        args.push(url.into());
        args.push(dest.to_string_lossy().into_owned());

        info!("git clone {} -> {}", url, dest.display());
        self.run(&args, None, on_output, cancel).await
    }

    /// Check out a ref (tag, branch, or commit), discarding local changes.
    pub async fn checkout(
        &self,
        repo_dir: &Path,
        refspec: &str,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            &["checkout".into(), refspec.into(), "--force".into()],
            Some(repo_dir),
            on_output,
            cancel,
        )
        .await
    }

    /// Fetch from origin; `tags` includes release tags.
    pub async fn fetch(
        &self,
        repo_dir: &Path,
        tags: bool,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut args: Vec<String> = vec!["fetch".into()];
        if tags {
            args.push("--tags".into());
        }
        self.run(&args, Some(repo_dir), on_output, cancel).await
    }

    /// Pull a branch from origin.
    pub async fn pull(
        &self,
        repo_dir: &Path,
        branch: &str,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            &["pull".into(), "origin".into(), branch.into()],
            Some(repo_dir),
            on_output,
            cancel,
        )
        .await
    }

    /// Initialize a repository and attach an origin remote.
    ///
    /// Used when an existing install directory is not a git checkout (e.g.
    /// restored from a backup) and needs to become updatable.
    pub async fn init_with_remote(
        &self,
        repo_dir: &Path,
        url: &str,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(&["init".into()], Some(repo_dir), on_output, cancel)
            .await?;
        self.run(
            &[
                "remote".into(),
                "add".into(),
                "origin".into(),
                url.into(),
            ],
            Some(repo_dir),
            on_output,
            cancel,
        )
        .await
    }

    /// Point origin at a new URL.
    pub async fn remote_set_url(
        &self,
        repo_dir: &Path,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            &[
                "remote".into(),
                "set-url".into(),
                "origin".into(),
                url.into(),
            ],
            Some(repo_dir),
            None,
            cancel,
        )
        .await
    }

    /// Resolve the current HEAD commit SHA.
    pub async fn rev_parse_head(&self, repo_dir: &Path) -> Result<String> {
        let output = Command::new(self.executable())
            .args(["rev-parse", "HEAD"])
            .current_dir(repo_dir)
            .output()
            .await
            .map_err(|e| HangarError::GitFailed {
                command: "rev-parse".into(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(HangarError::GitFailed {
                command: "rev-parse".into(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether the directory is a git checkout.
    pub fn is_git_repo(dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    fn executable(&self) -> PathBuf {
        self.git_path.clone().unwrap_or_else(|| PathBuf::from("git"))
    }

    /// Run a git command, streaming output and honoring cancellation.
    async fn run(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        on_output: OutputCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;

        let command_name = args.first().cloned().unwrap_or_default();
        debug!("Running git {}", args.join(" "));

        let mut cmd = Command::new(self.executable());
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| HangarError::GitFailed {
            command: command_name.clone(),
            message: format!("failed to start git: {}", e),
        })?;

        // Funnel stdout and stderr line-wise into one channel; git writes
        // progress to stderr.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(line_tx);

        let mut tail: Vec<String> = Vec::new();
        let mut poll = tokio::time::interval(Duration::from_millis(200));

        let status = loop {
            tokio::select! {
                line = line_rx.recv() => {
                    match line {
                        Some(line) => {
                            debug!("git: {}", line);
                            if let Some(cb) = on_output {
                                cb(&line);
                            }
                            tail.push(line);
                            if tail.len() > 20 {
                                tail.remove(0);
                            }
                        }
                        None => {
                            // Streams closed; wait for exit
                            break child.wait().await.map_err(|e| HangarError::GitFailed {
                                command: command_name.clone(),
                                message: e.to_string(),
                            })?;
                        }
                    }
                }
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        info!("Cancelling git {} (killing child)", command_name);
                        let _ = child.kill().await;
                        return Err(HangarError::InstallationCancelled);
                    }
                    if let Some(status) = child.try_wait().map_err(|e| HangarError::GitFailed {
                        command: command_name.clone(),
                        message: e.to_string(),
                    })? {
                        // Drain any buffered lines before reporting
                        while let Ok(line) = line_rx.try_recv() {
                            if let Some(cb) = on_output {
                                cb(&line);
                            }
                            tail.push(line);
                        }
                        break status;
                    }
                }
            }
        };

        if !status.success() {
            return Err(HangarError::GitFailed {
                command: command_name,
                message: tail.join("\n"),
            });
        }

        Ok(())
    }
}
