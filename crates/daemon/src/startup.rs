// Startup: compile the template, open the repository, find git, bind the listener.
//
// Every failure here is fatal; nothing is retried per request.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use git2::Repository;
use taiga_sync_common::render::TemplateRenderer;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServiceConfig;
use crate::git::push::GitPusher;
use crate::pipeline::UpdatePipeline;

/// Build the update pipeline described by `config`.
pub fn build_pipeline(config: &ServiceConfig) -> Result<UpdatePipeline> {
    let renderer = TemplateRenderer::from_file(&config.template)
        .with_context(|| format!("failed to compile template `{}`", config.template.display()))?;
    let repo = open_repository(&config.repo_root)?;
    let git = locate_git(config.git.as_deref())?;

    info!(
        repo = %config.repo_root.display(),
        target = %config.target.relative.display(),
        remote = %config.remote,
        "update pipeline ready"
    );

    let pusher = GitPusher::new(git, &config.repo_root, &config.remote);
    Ok(UpdatePipeline::new(
        repo,
        renderer,
        config.target.clone(),
        config.identity.clone(),
        Arc::new(pusher),
    ))
}

/// Open the one repository handle this process uses.
pub fn open_repository(root: &Path) -> Result<Repository> {
    let repo = Repository::open(root)
        .with_context(|| format!("failed to open repository `{}`", root.display()))?;
    if repo.is_bare() {
        bail!("repository `{}` has no working tree", root.display());
    }
    Ok(repo)
}

/// Resolve the git executable and check that it runs.
///
/// Uses `explicit` when given, otherwise the first `git` on `PATH`.
pub fn locate_git(explicit: Option<&Path>) -> Result<PathBuf> {
    let git = match explicit {
        Some(path) => path.to_path_buf(),
        None => which::which("git").context("cannot find git on PATH, is it installed?")?,
    };

    let output = Command::new(&git)
        .arg("--version")
        .output()
        .with_context(|| format!("failed to run `{} --version`", git.display()))?;
    if !output.status.success() {
        bail!("`{} --version` exited with {}", git.display(), output.status);
    }

    info!(
        git = %git.display(),
        version = %String::from_utf8_lossy(&output.stdout).trim(),
        "using git executable"
    );
    Ok(git)
}

pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind update listener on {addr}"))?;
    info!(addr = %listener.local_addr().unwrap_or(addr), "update listener bound");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_repository_rejects_plain_directories() {
        let tmp = TempDir::new().expect("temp dir should be created");
        assert!(open_repository(tmp.path()).is_err());
    }

    #[test]
    fn open_repository_rejects_bare_repositories() {
        let tmp = TempDir::new().expect("temp dir should be created");
        Repository::init_bare(tmp.path()).expect("bare repo should init");

        let Err(error) = open_repository(tmp.path()) else {
            panic!("bare repo should be rejected");
        };
        assert!(error.to_string().contains("no working tree"));
    }

    #[test]
    fn open_repository_accepts_working_trees() {
        let tmp = TempDir::new().expect("temp dir should be created");
        Repository::init(tmp.path()).expect("repo should init");

        let repo = open_repository(tmp.path()).expect("repo should open");
        assert!(repo.workdir().is_some());
    }

    #[test]
    fn locate_git_reports_missing_explicit_program() {
        let error = locate_git(Some(Path::new("/nonexistent/git"))).expect_err("should fail");
        assert!(format!("{error:#}").contains("/nonexistent/git --version"));
    }

    #[cfg(unix)]
    #[test]
    fn locate_git_rejects_failing_program() {
        let error = locate_git(Some(Path::new("/bin/false"))).expect_err("should fail");
        assert!(error.to_string().contains("--version"));
    }

    #[tokio::test]
    async fn bind_listener_accepts_ephemeral_port() {
        let listener =
            bind_listener("127.0.0.1:0".parse().expect("addr")).await.expect("bind should work");
        assert_ne!(listener.local_addr().expect("local addr").port(), 0);
    }
}
