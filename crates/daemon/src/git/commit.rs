// Stage-and-commit of the target file through libgit2.

use std::path::Path;

use git2::{Oid, Repository, Signature};
use thiserror::Error;

pub const DEFAULT_AUTHOR_NAME: &str = "Taiga Anime Updates";
pub const DEFAULT_AUTHOR_EMAIL: &str = "@taiga_updates";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Updated currently watching";

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to stage `{path}`: {source}")]
    Stage {
        path: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to commit: {0}")]
    Commit(#[from] git2::Error),
}

/// Author/committer identity and message used for every update commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_string(),
            email: DEFAULT_AUTHOR_EMAIL.to_string(),
            message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new commit was created on HEAD.
    Changed(Oid),
    /// The staged tree matches HEAD; nothing was committed.
    NoOp,
}

/// Stage `relative_path` and commit it on HEAD.
///
/// Returns [`CommitOutcome::NoOp`] when the resulting tree is identical to
/// the HEAD tree. An unborn HEAD gets a root commit.
pub fn commit_target(
    repo: &Repository,
    relative_path: &Path,
    identity: &CommitIdentity,
) -> Result<CommitOutcome, CommitError> {
    let stage_error = |source: git2::Error| CommitError::Stage {
        path: relative_path.display().to_string(),
        source,
    };

    let mut index = repo.index().map_err(stage_error)?;
    index.read(false).map_err(stage_error)?;
    index.add_path(relative_path).map_err(stage_error)?;
    index.write().map_err(stage_error)?;

    let tree_id = index.write_tree()?;
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(error)
            if matches!(error.code(), git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound) =>
        {
            None
        }
        Err(error) => return Err(error.into()),
    };

    if parent.as_ref().is_some_and(|commit| commit.tree_id() == tree_id) {
        return Ok(CommitOutcome::NoOp);
    }

    let tree = repo.find_tree(tree_id)?;
    let signature = Signature::now(&identity.name, &identity.email)?;
    let parents: Vec<_> = parent.iter().collect();
    let oid =
        repo.commit(Some("HEAD"), &signature, &signature, &identity.message, &tree, &parents)?;

    Ok(CommitOutcome::Changed(oid))
}
