use crate::env::Environment;
use crate::error::ShellError;
use nix::unistd::{AccessFlags, access};
use std::path::{Path, PathBuf};

/// Returns true if `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

/// Resolve a command name to the executable that would be launched for it.
///
/// Behavior:
/// - Name containing `/` (e.g. `/bin/sh`, `./build.sh`, `bin/tool`): not searched;
///   returns the name itself if it is executable.
/// - Bare name: searches each directory of the search path held in `search_path_var`,
///   in order, and returns the first `directory/name` that is executable.
/// - Empty name: not found.
///
/// Fails with [`ShellError::SearchPathUnset`] if a bare name must be searched but the
/// variable is unset, and with [`ShellError::CommandNotFound`] otherwise.
pub fn resolve(env: &Environment, search_path_var: &str, name: &str) -> Result<PathBuf, ShellError> {
    if name.is_empty() {
        return Err(ShellError::CommandNotFound(String::new()));
    }

    if name.contains('/') {
        let path = Path::new(name);
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            env.current_dir.join(path)
        };
        return if is_executable(&candidate) {
            Ok(candidate)
        } else {
            Err(ShellError::CommandNotFound(name.to_string()))
        };
    }

    let dirs = env
        .search_dirs(search_path_var)
        .ok_or_else(|| ShellError::SearchPathUnset {
            command: name.to_string(),
            var: search_path_var.to_string(),
        })?;

    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .inspect(|found| tracing::debug!(name, path = %found.display(), "resolved command"))
        .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))
}
