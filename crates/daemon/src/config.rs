// Command-line configuration for taiga-syncd.
//
// Positional arguments name the template, the target file and the repository;
// the remaining settings fall back to environment variables and defaults.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use clap::Parser;
use thiserror::Error;

use crate::git::commit::CommitIdentity;
use crate::pipeline::TargetFile;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9797";
pub const DEFAULT_REMOTE: &str = "origin";

const TEMPLATE_FIELDS_HELP: &str = "\
Template fields:
  Title                  The show title.
  Url                    The show URL, pointing at a tracker like AniList.
  ImageUrl               The show's cover art URL.
  TotalEps               The total number of episodes in the show.
  WatchedEps             The number of episodes watched.
  Rewatching             Whether the show is being rewatched.
  CurrentEpisode.Title   The title of the current episode.
  CurrentEpisode.Number  The current episode number.";

#[derive(Debug, Parser)]
#[command(
    name = "taiga-syncd",
    version,
    about = "Commit and push Taiga \"now watching\" updates to a git repository",
    after_help = TEMPLATE_FIELDS_HELP
)]
pub struct Cli {
    /// Handlebars template rendered for each update.
    pub template: PathBuf,

    /// File the rendered template is written to. Must be inside <REPO>.
    pub target: PathBuf,

    /// Git repository to commit to and push from.
    pub repo: PathBuf,

    /// Remote to push to.
    #[arg(default_value = DEFAULT_REMOTE)]
    pub remote: String,

    /// Address the update listener binds to.
    #[arg(long, env = "TAIGA_SYNC_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Git executable used for pushing. Defaults to `git` on PATH.
    #[arg(long, env = "TAIGA_SYNC_GIT")]
    pub git: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File {} does not exist!", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Repository {} does not exist!", .0.display())]
    NotARepository(PathBuf),

    #[error("File {} not in {}!", .target.display(), .repo.display())]
    TargetOutsideRepository { target: PathBuf, repo: PathBuf },

    #[error("failed to resolve `{}`: {source}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Validated service settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub template: PathBuf,
    pub target: TargetFile,
    pub repo_root: PathBuf,
    pub remote: String,
    pub git: Option<PathBuf>,
    pub identity: CommitIdentity,
}

impl ServiceConfig {
    /// Check the arguments against the filesystem. The target is resolved
    /// once here and not re-validated per request.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if !cli.template.is_file() {
            return Err(ConfigError::TemplateMissing(cli.template));
        }

        if !cli.repo.join(".git").exists() {
            return Err(ConfigError::NotARepository(cli.repo));
        }
        let repo_root = canonicalize(&cli.repo)?;
        let target = resolve_target(&cli.target, &repo_root)?;

        Ok(Self {
            listen: cli.listen,
            template: cli.template,
            target,
            repo_root,
            remote: cli.remote,
            git: cli.git,
            identity: CommitIdentity::default(),
        })
    }
}

/// Resolve `target` to an absolute path strictly inside `repo_root`.
///
/// The file itself may not exist yet; its parent directory must.
fn resolve_target(target: &Path, repo_root: &Path) -> Result<TargetFile, ConfigError> {
    let outside = || ConfigError::TargetOutsideRepository {
        target: target.to_path_buf(),
        repo: repo_root.to_path_buf(),
    };

    let file_name = match target.components().next_back() {
        Some(Component::Normal(name)) => name.to_owned(),
        _ => return Err(outside()),
    };
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let absolute = canonicalize(parent)?.join(file_name);
    let relative = absolute.strip_prefix(repo_root).map_err(|_| outside())?.to_path_buf();
    let first = relative.components().next();
    if first.is_none() || first == Some(Component::Normal(".git".as_ref())) {
        return Err(outside());
    }

    Ok(TargetFile { absolute, relative })
}

fn canonicalize(path: &Path) -> Result<PathBuf, ConfigError> {
    path.canonicalize()
        .map_err(|source| ConfigError::Resolve { path: path.to_path_buf(), source })
}
