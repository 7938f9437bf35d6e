use crate::builtin;
use crate::command::{Command, ExitCode};
use crate::completion::{self, Completion};
use crate::config::ShellConfig;
use crate::editor::{EditorState, LineEditor};
use crate::env::Environment;
use crate::error::ShellError;
use crate::history::History;
use crate::parser;
use crate::pipeline::{self, PipelineReport, StageIo};
use crate::terminal::{RawModeGuard, TerminalInput};
use std::io::{self, Write};

/// Everything one interactive session owns: the environment, the editing state
/// shared between keystrokes, and the configuration it was started with.
#[derive(Debug)]
pub struct Session {
    pub env: Environment,
    pub editor: EditorState,
    pub config: ShellConfig,
}

impl Session {
    pub fn new(config: ShellConfig, env: Environment) -> Self {
        Self {
            env,
            editor: EditorState {
                history: History::with_capacity(config.history_capacity),
                pending_completion: None,
            },
            config,
        }
    }
}

/// What running one line amounted to.
#[derive(Debug)]
pub enum LineOutcome {
    /// Blank line, or a line whose every stage the parser discarded.
    Empty,
    /// The line asked for completion instead of being run.
    Completed(Completion),
    Builtin(ExitCode),
    Pipeline(PipelineReport),
}

/// An interactive shell that reads lines, runs builtins in-process and
/// everything else as a pipeline of child processes.
///
/// Example
/// ```no_run
/// use pipesh::{Interpreter, ShellConfig};
/// let mut sh = Interpreter::new(ShellConfig::default());
/// let code = sh.repl().unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    session: Session,
}

impl Interpreter {
    /// Create an interpreter over a snapshot of the current process environment.
    pub fn new(config: ShellConfig) -> Self {
        Self::with_environment(config, Environment::new())
    }

    pub fn with_environment(config: ShellConfig, env: Environment) -> Self {
        Self {
            session: Session::new(config, env),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Parses and runs a single line.
    ///
    /// Builtin output goes to `stdout`/`stderr`; child processes use `streams`.
    /// Resolution failures are reported on `stderr` and don't fail the call.
    pub fn run_line(
        &mut self,
        line: &str,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        streams: StageIo,
    ) -> Result<LineOutcome, ShellError> {
        let command = parser::parse(line);
        let session = &mut self.session;

        if command.autocomplete_requested {
            let result = completion::complete(
                &session.env,
                &session.config.search_path_var,
                &command.name,
            );
            // The editor doesn't echo the tab, so the cursor is still on the input line.
            writeln!(stdout)?;
            match &result {
                Completion::NoMatch => writeln!(stdout, "no matches")?,
                Completion::SingleMatch(name) => {
                    session.editor.pending_completion = Some(name.clone());
                }
                Completion::MultipleMatches(names) | Completion::DirectoryListing(names) => {
                    for name in names {
                        writeln!(stdout, "{name}")?;
                    }
                }
            }
            return Ok(LineOutcome::Completed(result));
        }

        if command.stages().all(Command::is_empty) {
            return Ok(LineOutcome::Empty);
        }

        if let Some(code) = builtin::try_dispatch(&command, session, stdout, stderr) {
            return Ok(LineOutcome::Builtin(code));
        }

        // Children inherit our descriptors; anything buffered here must go first.
        stdout.flush()?;
        let report = pipeline::execute(
            &command,
            &session.env,
            &session.config.search_path_var,
            streams,
        )?;
        for skipped in &report.skipped {
            writeln!(stderr, "pipesh: {}", skipped.reason)?;
        }
        Ok(LineOutcome::Pipeline(report))
    }

    /// Read-eval loop over the controlling terminal.
    ///
    /// Runs until `exit` or end of input, and returns the shell's exit status.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut stdout = io::stdout();
        let mut stderr = io::stderr();
        let mut editor = LineEditor::new(
            TerminalInput::new()?,
            io::stdout(),
            self.session.config.max_line_bytes,
        );

        while !self.session.env.should_exit {
            write!(stdout, "{}", self.session.config.prompt)?;
            stdout.flush()?;

            let line = {
                let _raw = RawModeGuard::enable()?;
                editor.read_line(&mut self.session.editor)?
            };
            let Some(line) = line else {
                writeln!(stdout)?;
                break;
            };

            if let Err(err) = self.run_line(&line, &mut stdout, &mut stderr, StageIo::default()) {
                tracing::warn!(%err, "line failed");
                writeln!(stderr, "pipesh: {err}")?;
            }
        }
        Ok(0)
    }
}
