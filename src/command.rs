use std::ffi::CString;
use std::iter;

use crate::error::ShellError;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Children killed by a signal are reported as `128 + signal`, like POSIX shells do.
pub type ExitCode = i32;

/// Kind of redirection attached to a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): reads standard input from a file.
    Input,
    /// Output redirection (`>`): writes standard output to a file, truncating it first.
    Output,
    /// Output redirection with append (`>>`): writes standard output to the end of a file.
    Append,
}

impl RedirectKind {
    /// All kinds, in slot order.
    pub const ALL: [RedirectKind; 3] = [Self::Input, Self::Output, Self::Append];

    /// Index of this kind in [`Command::redirects`].
    pub const fn slot(self) -> usize {
        match self {
            Self::Input => 0,
            Self::Output => 1,
            Self::Append => 2,
        }
    }
}

/// One stage of a pipeline, as produced by [`crate::parser::parse`].
///
/// A stage exclusively owns the stage that follows it, so the head of a
/// pipeline owns the whole chain.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Command {
    /// Executable name as typed, with trailing sigils removed. Empty means "no command".
    pub name: String,
    /// Argument vector; element 0 is always `name`.
    pub arguments: Vec<String>,
    /// Set when the line ended with `&`. Parsed but not acted upon by the executor.
    pub background: bool,
    /// Set when the line ended with `?`; such a stage is completed, never executed.
    pub autocomplete_requested: bool,
    /// Redirection targets, indexed by [`RedirectKind::slot`].
    pub redirects: [Option<String>; 3],
    /// The next stage of the pipeline.
    pub next: Option<Box<Command>>,
}

impl Command {
    /// Creates a stage with the given name and no arguments besides `name` itself.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            arguments: vec![name.clone()],
            name,
            background: false,
            autocomplete_requested: false,
            redirects: Default::default(),
            next: None,
        }
    }

    /// Number of argument vector slots, counting `name` and the terminating
    /// sentinel that the exec call appends.
    pub fn argument_count(&self) -> usize {
        self.arguments.len() + 1
    }

    /// Arguments following the name.
    pub fn args(&self) -> &[String] {
        self.arguments.get(1..).unwrap_or_default()
    }

    /// Returns the redirection target for the given kind, if any.
    pub fn redirect(&self, kind: RedirectKind) -> Option<&str> {
        self.redirects[kind.slot()].as_deref()
    }

    /// Returns true if any redirection slot is filled.
    pub fn has_redirects(&self) -> bool {
        self.redirects.iter().any(Option::is_some)
    }

    /// Returns true if this line carries no command at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Iterates over this stage and every stage that follows it.
    pub fn stages(&self) -> impl Iterator<Item = &Command> + '_ {
        iter::successors(Some(self), |stage| stage.next.as_deref())
    }

    /// Number of stages in the pipeline starting at this stage.
    pub fn stage_count(&self) -> usize {
        self.stages().count()
    }

    /// Builds the NUL-terminated argument vector handed to `execve`.
    pub fn argv(&self) -> Result<Vec<CString>, ShellError> {
        self.arguments
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| ShellError::InvalidArgument(arg.clone()))
            })
            .collect()
    }
}

impl Drop for Command {
    // Unlink the chain one stage at a time so long pipelines don't recurse.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut stage) = next {
            next = stage.next.take();
        }
    }
}
