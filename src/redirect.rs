//! Rewires the standard streams of a freshly forked child to the files named by
//! its redirections. Only ever called between `fork` and `exec`.

use crate::command::RedirectKind;
use nix::unistd::dup2;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Permissions for files created by `>` and `>>`: rw-r--r--, subject to the umask.
const CREATE_MODE: u32 = 0o644;

/// A redirection that could not be applied.
#[derive(thiserror::Error, Debug)]
#[error("{target}: {source}")]
pub struct RedirectError {
    target: String,
    #[source]
    source: io::Error,
}

fn open(kind: RedirectKind, target: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    match kind {
        RedirectKind::Input => options.read(true),
        RedirectKind::Output => options
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CREATE_MODE),
        RedirectKind::Append => options.append(true).create(true).mode(CREATE_MODE),
    };
    options.open(target)
}

fn stream_for(kind: RedirectKind) -> RawFd {
    match kind {
        RedirectKind::Input => nix::libc::STDIN_FILENO,
        RedirectKind::Output | RedirectKind::Append => nix::libc::STDOUT_FILENO,
    }
}

/// Opens every filled redirection slot, in slot order, and duplicates it onto
/// stdin (slot 0) or stdout (slots 1 and 2). The opened descriptor is closed
/// once duplicated.
pub fn apply(redirects: &[Option<String>; 3]) -> Result<(), RedirectError> {
    for kind in RedirectKind::ALL {
        let Some(target) = redirects[kind.slot()].as_deref() else {
            continue;
        };
        let error = |source| RedirectError {
            target: target.to_string(),
            source,
        };
        let file = open(kind, Path::new(target)).map_err(error)?;
        dup2(file.as_raw_fd(), stream_for(kind)).map_err(|errno| error(errno.into()))?;
    }
    Ok(())
}
