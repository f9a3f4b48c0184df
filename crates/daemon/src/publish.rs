// Target file publishing: full overwrite of the rendered update.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to write `{}`: {source}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Replace the file contents with `text` (UTF-8, no BOM).
///
/// A failed write may leave the file truncated.
pub fn write_target(path: &Path, text: &str) -> Result<(), WriteError> {
    let wrap = |source: std::io::Error| WriteError { path: path.to_path_buf(), source };

    let mut file = File::create(path).map_err(wrap)?;
    file.write_all(text.as_bytes()).map_err(wrap)?;
    file.flush().map_err(wrap)
}
