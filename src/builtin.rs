use crate::command::{Command, ExitCode};
use crate::interpreter::Session;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Root of the process-information filesystem.
const PROC_ROOT: &str = "/proc";

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in the shell process, so they can change its state.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    fn name() -> &'static str;

    /// Executes the command, writing regular output to `stdout`.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode>;
}

type Dispatch =
    fn(&Command, &mut Session, &mut dyn Write, &mut dyn Write) -> Option<Result<ExitCode>>;

const BUILTINS: [Dispatch; 4] = [
    try_run::<Cd>,
    try_run::<Exit>,
    try_run::<HistoryCmd>,
    try_run::<Lsfd>,
];

/// Runs `cmd` as builtin `T` if the names match.
///
/// Argument errors and `--help` are handled by argh: the message goes to `stderr`
/// or `stdout` respectively.
fn try_run<T: BuiltinCommand>(
    cmd: &Command,
    session: &mut Session,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Option<Result<ExitCode>> {
    if cmd.name != T::name() {
        return None;
    }
    let args: Vec<&str> = cmd.args().iter().map(String::as_str).collect();
    Some(match T::from_args(&[T::name()], &args) {
        Ok(builtin) => builtin.execute(stdout, session),
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => writeln!(stdout, "{output}").map(|()| 0).map_err(Into::into),
            Err(()) => writeln!(stderr, "{output}").map(|()| 1).map_err(Into::into),
        },
    })
}

/// Runs `cmd` in the shell process if it is a builtin.
///
/// Only a lone stage without redirections is considered; in any other position a
/// builtin name is looked up on the search path like any other program. Returns
/// `None` when `cmd` is not handled here. Failures are reported on `stderr` and
/// turned into exit code 1.
pub fn try_dispatch(
    cmd: &Command,
    session: &mut Session,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Option<ExitCode> {
    if cmd.next.is_some() || cmd.has_redirects() {
        return None;
    }
    if cmd.is_empty() {
        return Some(0);
    }

    let result = BUILTINS
        .iter()
        .find_map(|dispatch| dispatch(cmd, session, stdout, stderr))?;
    Some(match result {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(builtin = %cmd.name, "{err:#}");
            let _ = writeln!(stderr, "{err:#}");
            1
        }
    })
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let env = &mut session.env;
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("cd: no target and HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical =
            fs::canonicalize(&new_dir).with_context(|| format!("cd: {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell with status 0.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        session.env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the lines entered so far, oldest first, each preceded by its index.
pub struct HistoryCmd {}

impl BuiltinCommand for HistoryCmd {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        for (index, line) in session.editor.history.iter().enumerate() {
            writeln!(stdout, "{index} {line}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Write the open file descriptors of a process to a file, one
/// "fd <number> -> <target>" line each.
pub struct Lsfd {
    #[argh(positional)]
    /// id of the process to inspect
    pub pid: u32,

    #[argh(positional)]
    /// file to write the report to; truncated if it exists
    pub output: PathBuf,
}

/// Lists the descriptor links in `fd_dir`, sorted by descriptor number.
///
/// Links that vanish while being read (such as the descriptor used to read the
/// directory itself) are left out.
fn describe_descriptors(fd_dir: &Path) -> std::io::Result<Vec<(u32, PathBuf)>> {
    let mut fds: Vec<u32> = fs::read_dir(fd_dir)?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    fds.sort_unstable();

    Ok(fds
        .into_iter()
        .filter_map(|fd| match fs::read_link(fd_dir.join(fd.to_string())) {
            Ok(target) => Some((fd, target)),
            Err(err) => {
                tracing::debug!(fd, %err, "descriptor disappeared");
                None
            }
        })
        .collect())
}

impl BuiltinCommand for Lsfd {
    fn name() -> &'static str {
        "lsfd"
    }

    fn execute(self, _stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        let fd_dir = Path::new(PROC_ROOT).join(self.pid.to_string()).join("fd");
        let descriptors = describe_descriptors(&fd_dir)
            .with_context(|| format!("lsfd: cannot read {}", fd_dir.display()))?;

        let file = File::create(&self.output)
            .with_context(|| format!("lsfd: cannot create {}", self.output.display()))?;
        let mut out = BufWriter::new(file);
        for (fd, target) in descriptors {
            writeln!(out, "fd {fd} -> {}", target.display())?;
        }
        out.flush()
            .with_context(|| format!("lsfd: cannot write {}", self.output.display()))?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::env::Environment;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use std::env as stdenv;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session() -> Session {
        Session::new(ShellConfig::default(), Environment::new())
    }

    fn dispatch(line: &str, session: &mut Session) -> (Option<ExitCode>, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = try_dispatch(&parse(line), session, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_empty_line_is_a_silent_no_op() {
        let mut session = session();
        assert_eq!(dispatch("   ", &mut session), (Some(0), String::new(), String::new()));
    }

    #[test]
    fn test_unknown_names_are_not_builtins() {
        let mut session = session();
        assert_eq!(dispatch("ls -l", &mut session).0, None);
    }

    #[test]
    fn test_builtins_only_run_as_lone_unredirected_stage() {
        let mut session = session();
        assert_eq!(dispatch("exit | cat", &mut session).0, None);
        assert_eq!(dispatch("history > out.txt", &mut session).0, None);
        assert!(!session.env.should_exit);
    }

    #[test]
    fn test_exit_requests_shutdown() {
        let mut session = session();
        assert_eq!(dispatch("exit", &mut session).0, Some(0));
        assert!(session.env.should_exit);
    }

    #[test]
    fn test_history_prints_indexed_entries() {
        let mut session = session();
        for line in ["ls", "echo hi", "history"] {
            session.editor.history.record(line);
        }
        let (code, out, _) = dispatch("history", &mut session);
        assert_eq!(code, Some(0));
        assert_eq!(out, "0 ls\n1 echo hi\n2 history\n");
    }

    #[test]
    fn test_history_after_overflow_starts_at_second_line() {
        let mut session = session();
        for i in 1..=141 {
            session.editor.history.record(&format!("cmd {i}"));
        }
        let (_, out, _) = dispatch("history", &mut session);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 140);
        assert_eq!(lines[0], "0 cmd 2");
        assert_eq!(lines[139], "139 cmd 141");
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut session = session();
        let (code, _, err) = dispatch(&format!("cd {}", canonical_temp.display()), &mut session);

        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert_eq!(code, Some(0), "{err}");
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(session.env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_relative_to_session_dir() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        fs::create_dir(canonical_temp.join("child")).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut session = session();
        session.env.current_dir = canonical_temp.clone();
        let (code, _, _) = dispatch("cd child", &mut session);
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert_eq!(code, Some(0));
        assert_eq!(session.env.current_dir, canonical_temp.join("child"));
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut session = session();
        session
            .env
            .set_var("HOME", canonical_temp.to_string_lossy().to_string());
        let (code, _, _) = dispatch("cd", &mut session);
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert_eq!(code, Some(0));
        assert_eq!(session.env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_nonexistent_path_reports_path_and_keeps_cwd() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut session = session();
        let target = format!("/nonexistent_dir_for_pipesh_test_{}", std::process::id());
        let (code, _, err) = dispatch(&format!("cd {target}"), &mut session);

        assert_eq!(code, Some(1));
        assert!(err.contains(&target), "{err}");
        assert!(err.contains("No such file or directory"), "{err}");
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert!(!session.env.should_exit);
    }

    #[test]
    fn test_lsfd_reports_own_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("fds.txt");
        let marker = dir.path().join("marker.txt");
        let _held_open = File::create(&marker).unwrap();
        let marker = fs::canonicalize(&marker).unwrap();

        let mut session = session();
        let line = format!("lsfd {} {}", std::process::id(), report.display());
        let (code, _, err) = dispatch(&line, &mut session);
        assert_eq!(code, Some(0), "{err}");

        let contents = fs::read_to_string(&report).unwrap();
        assert!(contents.lines().all(|l| l.starts_with("fd ") && l.contains(" -> ")));
        assert!(contents.contains(&format!("-> {}", marker.display())), "{contents}");
    }

    #[test]
    fn test_lsfd_unknown_process_creates_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("fds.txt");

        let mut session = session();
        let line = format!("lsfd 999999999 {}", report.display());
        let (code, _, err) = dispatch(&line, &mut session);

        assert_eq!(code, Some(1));
        assert!(err.starts_with("lsfd: cannot read /proc/999999999/fd"), "{err}");
        assert!(!report.exists());
    }

    #[test]
    fn test_lsfd_unwritable_output_is_reported() {
        let mut session = session();
        let line = format!("lsfd {} /no/such/dir/fds.txt", std::process::id());
        let (code, _, err) = dispatch(&line, &mut session);
        assert_eq!(code, Some(1));
        assert!(err.starts_with("lsfd: cannot create /no/such/dir/fds.txt"), "{err}");
    }

    #[test]
    fn test_lsfd_argument_errors_come_from_argh() {
        let mut session = session();
        let (code, _, err) = dispatch("lsfd notapid out.txt", &mut session);
        assert_eq!(code, Some(1));
        assert!(!err.is_empty());
    }
}
