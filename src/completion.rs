//! Executable-name completion over the search path.

use crate::env::Environment;
use crate::external::is_executable;
use std::fs;
use std::io;
use std::path::Path;

/// Outcome of a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Nothing on the search path starts with the prefix.
    NoMatch,
    /// Exactly one executable name starts with the prefix.
    SingleMatch(String),
    /// Several executable names start with the prefix, in first-seen order.
    MultipleMatches(Vec<String>),
    /// The prefix already names an executable verbatim; holds the entries of the
    /// current working directory instead.
    DirectoryListing(Vec<String>),
}

impl Completion {
    fn from_matches(mut matches: Vec<String>) -> Self {
        match matches.len() {
            0 => Self::NoMatch,
            1 => Self::SingleMatch(matches.remove(0)),
            _ => Self::MultipleMatches(matches),
        }
    }
}

fn list_dir(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Completes `prefix` against the executables in every directory of the search path.
///
/// Names are deduplicated across directories, keeping the order in which they are
/// first seen. Unreadable directories are skipped; an unset search path yields
/// [`Completion::NoMatch`].
pub fn complete(env: &Environment, search_path_var: &str, prefix: &str) -> Completion {
    let Some(dirs) = env.search_dirs(search_path_var) else {
        return Completion::NoMatch;
    };

    let mut matches: Vec<String> = Vec::new();
    for dir in &dirs {
        let names = match list_dir(dir) {
            Ok(names) => names,
            Err(err) => {
                tracing::debug!(target: "complete", dir = %dir.display(), %err, "skipping directory");
                continue;
            }
        };

        for name in names {
            if !name.starts_with(prefix) {
                continue;
            }
            let candidate = dir.join(&name);
            if !is_executable(&candidate) {
                continue;
            }
            if name == prefix {
                tracing::debug!(target: "complete", path = %candidate.display(), "complete name typed, listing cwd");
                return Completion::DirectoryListing(
                    list_dir(&env.current_dir).unwrap_or_default(),
                );
            }
            if !matches.contains(&name) {
                matches.push(name);
            }
        }
    }

    Completion::from_matches(matches)
}
