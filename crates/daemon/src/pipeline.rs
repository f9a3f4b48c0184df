// Update pipeline: decode → render → write → stage → commit → push.
//
// The repository handle lives behind an async mutex owned by the pipeline.
// The guard is held from the file write until the commit returns, so
// concurrent requests never interleave their write/stage/commit steps. The
// push is launched after the guard is released and is not awaited.

use std::path::PathBuf;
use std::sync::Arc;

use git2::Repository;
use taiga_sync_common::payload::decode_payload;
use taiga_sync_common::render::TemplateRenderer;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::git::commit::{commit_target, CommitIdentity, CommitOutcome};
use crate::git::push::{InFlightPushes, PendingPush, PushLauncher};
use crate::publish::write_target;

/// The file updates are written to, inside the repository working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFile {
    /// Where the rendered text is written.
    pub absolute: PathBuf,
    /// Path staged in the index, relative to the repository root.
    pub relative: PathBuf,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub commit: CommitOutcome,
    /// `None` when the push could not be launched.
    pub push: Option<PendingPush>,
}

#[derive(Clone)]
pub struct UpdatePipeline {
    repo: Arc<Mutex<Repository>>,
    shared: Arc<Shared>,
}

struct Shared {
    renderer: TemplateRenderer,
    target: TargetFile,
    identity: CommitIdentity,
    pusher: Arc<dyn PushLauncher>,
    pushes: InFlightPushes,
}

impl UpdatePipeline {
    pub fn new(
        repo: Repository,
        renderer: TemplateRenderer,
        target: TargetFile,
        identity: CommitIdentity,
        pusher: Arc<dyn PushLauncher>,
    ) -> Self {
        Self {
            repo: Arc::new(Mutex::new(repo)),
            shared: Arc::new(Shared {
                renderer,
                target,
                identity,
                pusher,
                pushes: InFlightPushes::default(),
            }),
        }
    }

    /// Pushes launched by this pipeline that callers chose not to await.
    pub fn pushes(&self) -> &InFlightPushes {
        &self.shared.pushes
    }

    /// Run one update body through every stage. The first failing stage
    /// ends the run; nothing is retried.
    pub async fn run(&self, body: &[u8]) -> Result<PipelineOutcome, PipelineError> {
        let record = decode_payload(body)?;
        info!(
            title = %record.title,
            url = %record.url,
            image_url = %record.image_url,
            episode = record.current_episode.number,
            episode_title = %record.current_episode.title,
            watched_eps = record.watched_eps,
            total_eps = record.total_eps,
            rewatching = record.rewatching,
            "update decoded"
        );

        let rendered = self.shared.renderer.render(&record)?;
        debug!(bytes = rendered.len(), "update rendered");

        let commit = self.publish(rendered).await?;
        match commit {
            CommitOutcome::Changed(oid) => info!(%oid, "update committed"),
            CommitOutcome::NoOp => info!("rendered output unchanged, nothing to commit"),
        }

        // A no-op still pushes: an earlier push may have failed after its commit.
        let push = match self.shared.pusher.launch() {
            Ok(pending) => Some(pending),
            Err(error) => {
                error!(%error, "failed to launch push");
                None
            }
        };

        Ok(PipelineOutcome { commit, push })
    }

    async fn publish(&self, rendered: String) -> Result<CommitOutcome, PipelineError> {
        let repo = Arc::clone(&self.repo).lock_owned().await;
        let shared = Arc::clone(&self.shared);

        tokio::task::spawn_blocking(move || -> Result<CommitOutcome, PipelineError> {
            write_target(&shared.target.absolute, &rendered)?;
            debug!(path = %shared.target.absolute.display(), "target written");
            Ok(commit_target(&repo, &shared.target.relative, &shared.identity)?)
        })
        .await
        .map_err(|error| PipelineError::Internal(error.to_string()))?
    }
}
