use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::CString;
use std::path::PathBuf;

/// Session-owned snapshot of the process environment.
///
/// The environment contains:
/// - `vars`: the variables handed to every executed program, and the place the
///   search path is read from.
/// - `current_dir`: the working directory, kept in sync with the process cwd by `cd`.
/// - `should_exit`: set by the `exit` builtin; the interactive loop stops once it is set.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_vars(stdenv::vars(), current_dir)
    }

    /// Build an environment from explicit variables, detached from the process.
    pub fn from_vars<K, V>(
        vars: impl IntoIterator<Item = (K, V)>,
        current_dir: impl Into<PathBuf>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            current_dir: current_dir.into(),
            should_exit: false,
        }
    }

    /// Get the value of a variable. Variables missing from the snapshot are unset.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Splits the `:`-separated search path held in `key` into its directories.
    ///
    /// Empty components are skipped. Returns `None` when the variable is unset.
    pub fn search_dirs(&self, key: &str) -> Option<Vec<PathBuf>> {
        self.get_var(key).map(|value| {
            value
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect()
        })
    }

    /// `KEY=VALUE` strings for `execve`. Pairs that can't be represented as C strings are dropped.
    pub fn envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
