// Detached `git push <remote>` with output streamed to the log.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// What a finished push left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    pub status: Option<ExitStatus>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

impl PushReport {
    pub fn succeeded(&self) -> bool {
        self.status.is_some_and(|status| status.success())
    }
}

/// An in-flight push. Dropping it leaves the push running.
#[derive(Debug)]
pub struct PendingPush {
    task: JoinHandle<PushReport>,
}

impl PendingPush {
    /// Wait for the subprocess to exit and both output streams to drain.
    pub async fn wait(self) -> Option<PushReport> {
        self.task.await.ok()
    }
}

/// Pushes handed off by the HTTP layer, kept so shutdown can wait for them.
#[derive(Debug, Clone, Default)]
pub struct InFlightPushes {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl InFlightPushes {
    /// Keep `push` running in the background. Must be called inside a runtime.
    pub fn track(&self, push: PendingPush) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            push.wait().await;
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait up to `timeout` for every tracked push to finish. Returns how many
    /// were still running when the wait gave up. Their subprocesses are not killed.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if tasks.is_empty() {
            return 0;
        }

        info!(pending = tasks.len(), "waiting for in-flight pushes");
        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pending = tasks.len(), "gave up waiting for in-flight pushes");
        }
        tasks.len()
    }
}

pub trait PushLauncher: Send + Sync {
    fn launch(&self) -> Result<PendingPush, PushError>;
}

#[derive(Debug, Clone)]
pub struct GitPusher {
    program: PathBuf,
    repo_root: PathBuf,
    remote: Arc<str>,
}

impl GitPusher {
    pub fn new(
        program: impl Into<PathBuf>,
        repo_root: impl Into<PathBuf>,
        remote: impl AsRef<str>,
    ) -> Self {
        Self {
            program: program.into(),
            repo_root: repo_root.into(),
            remote: Arc::from(remote.as_ref()),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn command_line(&self) -> String {
        format!("{} push {}", self.program.display(), self.remote)
    }
}

impl PushLauncher for GitPusher {
    fn launch(&self) -> Result<PendingPush, PushError> {
        let mut child = Command::new(&self.program)
            .arg("push")
            .arg(&*self.remote)
            .current_dir(&self.repo_root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PushError::Spawn { command: self.command_line(), source })?;

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(forward_lines(out, Arc::clone(&self.remote), OutputStream::Stdout))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(forward_lines(err, Arc::clone(&self.remote), OutputStream::Stderr))
        });

        let remote = Arc::clone(&self.remote);
        debug!(remote = %remote, pid = ?child.id(), "git push launched");

        let task = tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => Some(status),
                Err(error) => {
                    error!(remote = %remote, %error, "failed to wait for git push");
                    None
                }
            };
            let stdout_lines = join_count(stdout).await;
            let stderr_lines = join_count(stderr).await;

            match status {
                Some(status) if status.success() => info!(remote = %remote, "git push finished"),
                Some(status) => {
                    error!(remote = %remote, code = ?status.code(), "git push failed")
                }
                None => {}
            }

            PushReport { status, stdout_lines, stderr_lines }
        });

        Ok(PendingPush { task })
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(reader: R, remote: Arc<str>, stream: OutputStream) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                match stream {
                    OutputStream::Stdout => debug!(remote = %remote, "git: {line}"),
                    OutputStream::Stderr => error!(remote = %remote, "git: {line}"),
                }
            }
            Ok(None) => break,
            Err(error) => {
                warn!(remote = %remote, ?stream, %error, "failed to read git output");
                break;
            }
        }
    }

    count
}

async fn join_count(task: Option<JoinHandle<usize>>) -> usize {
    match task {
        Some(task) => task.await.unwrap_or(0),
        None => 0,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::LogCapture;
    use tempfile::TempDir;

    // `sh push <remote>` runs the `push` script in the repo root, standing in for git.
    fn fake_git(script: &str) -> (TempDir, GitPusher) {
        let tmp = TempDir::new().expect("temp dir should be created");
        std::fs::write(tmp.path().join("push"), script).expect("script should be written");
        let pusher = GitPusher::new("/bin/sh", tmp.path(), "upstream");
        (tmp, pusher)
    }

    #[tokio::test]
    async fn runs_push_with_remote_in_repo_root_and_streams_output() {
        let (tmp, pusher) = fake_git(
            "echo \"$0 $1\" > args.txt\necho 'out one'\necho 'out two'\necho 'err one' >&2\n",
        );

        let report = pusher
            .launch()
            .expect("push should spawn")
            .wait()
            .await
            .expect("push task should complete");

        assert!(report.succeeded());
        assert_eq!(report.stdout_lines, 2);
        assert_eq!(report.stderr_lines, 1);
        let args = std::fs::read_to_string(tmp.path().join("args.txt")).expect("args recorded");
        assert_eq!(args.trim(), "push upstream");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let (_tmp, pusher) = fake_git("echo 'rejected' >&2\nexit 3\n");

        let report = pusher
            .launch()
            .expect("push should spawn")
            .wait()
            .await
            .expect("push task should complete");

        assert!(!report.succeeded());
        assert_eq!(report.status.and_then(|status| status.code()), Some(3));
        assert_eq!(report.stderr_lines, 1);
    }

    #[tokio::test]
    async fn stdout_logs_at_debug_and_stderr_at_error() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let remote: Arc<str> = Arc::from("origin");
        forward_lines(&b"Everything up-to-date\n"[..], Arc::clone(&remote), OutputStream::Stdout)
            .await;
        forward_lines(&b"! [rejected] main -> main\n"[..], remote, OutputStream::Stderr).await;

        let out = logs.line_with("git: Everything up-to-date").expect("stdout line logged");
        assert!(out.contains("DEBUG"), "{out}");
        let err = logs.line_with("git: ! [rejected] main -> main").expect("stderr line logged");
        assert!(err.contains("ERROR"), "{err}");
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_pushes() {
        let (tmp, pusher) = fake_git("sleep 0.2\necho done > pushed.txt\n");
        let pushes = InFlightPushes::default();

        pushes.track(pusher.launch().expect("push should spawn"));
        assert_eq!(pushes.len(), 1);

        assert_eq!(pushes.drain(Duration::from_secs(10)).await, 0);
        assert!(tmp.path().join("pushed.txt").exists());
        assert_eq!(pushes.len(), 0);
    }

    #[tokio::test]
    async fn drain_gives_up_after_timeout() {
        let (_tmp, pusher) = fake_git("sleep 5\n");
        let pushes = InFlightPushes::default();

        pushes.track(pusher.launch().expect("push should spawn"));

        assert_eq!(pushes.drain(Duration::from_millis(50)).await, 1);
    }

    #[tokio::test]
    async fn draining_nothing_returns_immediately() {
        assert_eq!(InFlightPushes::default().drain(Duration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let tmp = TempDir::new().expect("temp dir should be created");
        let pusher = GitPusher::new("/nonexistent/git", tmp.path(), "origin");

        let error = pusher.launch().expect_err("spawn should fail");
        assert!(error.to_string().contains("/nonexistent/git push origin"));
    }
}
