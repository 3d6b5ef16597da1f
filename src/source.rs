//! Locating and reading the program source.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{SubmitError, SubmitResult};

/// The source file as given if it exists, otherwise the same name under the
/// configuration directory.
pub fn resolve_program_source(sql_file: &Path, conf_dir: &Path) -> SubmitResult<PathBuf> {
    if sql_file.is_file() {
        return Ok(sql_file.to_path_buf());
    }

    let in_conf_dir = conf_dir.join(sql_file);
    if in_conf_dir.is_file() {
        debug!("Using program source from conf dir: {}", in_conf_dir.display());
        return Ok(in_conf_dir);
    }

    Err(SubmitError::SqlFileNotFound {
        direct: sql_file.to_path_buf(),
        in_conf_dir,
    })
}

pub fn read_program_source(sql_file: &Path, conf_dir: &Path) -> SubmitResult<String> {
    let path = resolve_program_source(sql_file, conf_dir)?;
    fs::read_to_string(&path).map_err(|e| {
        SubmitError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })
}
