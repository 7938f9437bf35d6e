//! A small interactive shell built around a fork/pipe command pipeline engine.
//!
//! A line typed at the prompt goes through the raw-mode [`editor`], is turned into
//! a chain of [`command::Command`] stages by the [`parser`], and is then either run
//! in-process as a builtin (`cd`, `exit`, `history`, `lsfd`) or handed to the
//! [`pipeline`] orchestrator, which forks one child per stage, wires them together
//! with pipes and applies per-stage [`redirect`]ions before exec.
//!
//! The main entry point is [`Interpreter`], which owns a [`interpreter::Session`]
//! (environment snapshot, history and completion state) and drives the
//! read-eval loop.

mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod editor;
pub mod env;
pub mod error;
pub mod external;
pub mod history;
pub mod interpreter;
pub mod parser;
pub mod pipeline;
pub mod redirect;
pub mod terminal;

/// Just a convenient re-export of the interactive shell.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;

pub use config::ShellConfig;
pub use error::ShellError;
