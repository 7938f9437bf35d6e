/// Errors surfaced by the pipeline engine to the interactive loop.
#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    #[error("{command}: command not found ({var} is not set)")]
    SearchPathUnset { command: String, var: String },

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
