//! Runs a parsed pipeline as one child process per stage.
//!
//! Stages are wired left to right: every stage but the last writes into a fresh
//! pipe whose read end becomes the next stage's stdin. The parent closes its copy
//! of each descriptor as soon as the child that needs it has been forked, so the
//! last writer exiting is what delivers end-of-file downstream.

use crate::command::{Command, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external;
use crate::redirect;
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, execve, fork};
use std::ffi::CString;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

/// Exit status of a child whose redirections could not be applied.
const REDIRECT_FAILURE: ExitCode = 1;
/// Exit status of a child whose program could not be executed.
const EXEC_FAILURE: ExitCode = 127;

/// The descriptors a pipeline reads from and finally writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageIo {
    pub stdin: RawFd,
    pub stdout: RawFd,
}

impl Default for StageIo {
    /// The shell's own stdin and stdout.
    fn default() -> Self {
        Self {
            stdin: nix::libc::STDIN_FILENO,
            stdout: nix::libc::STDOUT_FILENO,
        }
    }
}

/// A stage left out of the pipeline because it couldn't be resolved.
#[derive(Debug)]
pub struct SkippedStage {
    pub name: String,
    pub reason: ShellError,
}

/// What happened to each stage of an executed pipeline.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Name and exit code of every stage that ran, in pipeline order.
    pub statuses: Vec<(String, ExitCode)>,
    pub skipped: Vec<SkippedStage>,
}

impl PipelineReport {
    /// Exit code of the last stage that ran.
    pub fn last_status(&self) -> Option<ExitCode> {
        self.statuses.last().map(|(_, code)| *code)
    }
}

/// Everything a child needs in order to exec, built before forking.
#[derive(Debug)]
pub struct PreparedStage {
    name: String,
    path: CString,
    argv: Vec<CString>,
    redirects: [Option<String>; 3],
}

impl PreparedStage {
    /// Resolves the stage's executable and converts its arguments for `execve`.
    pub fn new(stage: &Command, env: &Environment, search_path_var: &str) -> Result<Self, ShellError> {
        let path = external::resolve(env, search_path_var, &stage.name)?;
        let path = CString::new(path.into_os_string().into_encoded_bytes())
            .map_err(|_| ShellError::InvalidArgument(stage.name.clone()))?;
        Ok(Self {
            name: stage.name.clone(),
            path,
            argv: stage.argv()?,
            redirects: stage.redirects.clone(),
        })
    }
}

/// Writes a diagnostic from inside a child without touching the standard
/// library's stderr lock, which another thread may have held at fork time.
fn report_from_child(message: &str) {
    if let Ok(fd) = io::stderr().as_fd().try_clone_to_owned() {
        let _ = File::from(fd).write_all(message.as_bytes());
    }
}

/// Moves `fd` onto `target` and closes the original.
fn rewire(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd != target {
        dup2(fd, target)?;
        close(fd)?;
    }
    Ok(())
}

/// Child side of [`spawn_stage`]. Only returns if the program could not be started.
fn exec_child(
    stage: &PreparedStage,
    envp: &[CString],
    stdin: RawFd,
    stdout: RawFd,
    unused_read_end: Option<RawFd>,
) -> ExitCode {
    if let Some(fd) = unused_read_end {
        let _ = close(fd);
    }
    let wired = rewire(stdin, nix::libc::STDIN_FILENO)
        .and_then(|()| rewire(stdout, nix::libc::STDOUT_FILENO));
    if let Err(errno) = wired {
        report_from_child(&format!("pipesh: {}: {errno}\n", stage.name));
        return EXEC_FAILURE;
    }

    if let Err(err) = redirect::apply(&stage.redirects) {
        report_from_child(&format!("pipesh: {err}\n"));
        return REDIRECT_FAILURE;
    }

    let Err(errno) = execve(&stage.path, &stage.argv, envp);
    report_from_child(&format!("pipesh: {}: {errno}\n", stage.name));
    EXEC_FAILURE
}

/// Forks a child that reads from `stdin`, writes to `stdout` and execs `stage`.
///
/// `unused_read_end` is the read end of the pipe the child writes into; the child
/// closes it before exec. The caller keeps ownership of every descriptor passed in
/// and is responsible for closing its own copies after this returns.
pub fn spawn_stage(
    stage: &PreparedStage,
    envp: &[CString],
    stdin: RawFd,
    stdout: RawFd,
    unused_read_end: Option<RawFd>,
) -> Result<Pid, ShellError> {
    // Anything still buffered would otherwise be written twice.
    io::stdout().flush()?;

    // SAFETY: the child only rewires descriptors and then either execs or leaves
    // through `_exit`; it never returns into the caller.
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            tracing::debug!(stage = %stage.name, pid = %child, stdin, stdout, "spawned stage");
            Ok(child)
        }
        ForkResult::Child => {
            let code = exec_child(stage, envp, stdin, stdout, unused_read_end);
            // SAFETY: `_exit` skips atexit handlers and stdio flushing, which belong
            // to the parent's copy of the process state.
            unsafe { nix::libc::_exit(code) }
        }
    }
}

/// Waits for `pid` to terminate and converts its status to an exit code.
fn reap(pid: Pid) -> nix::Result<ExitCode> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Executes every stage of `pipeline` and waits for all of them.
///
/// A stage whose executable can't be resolved is skipped and recorded in the
/// report; its neighbours are connected directly, so `a | missing | c` behaves
/// like `a | c`. Stages the parser discarded are left out the same way, without
/// being reported. The `background` flag is ignored: the call always waits.
pub fn execute(
    pipeline: &Command,
    env: &Environment,
    search_path_var: &str,
    streams: StageIo,
) -> Result<PipelineReport, ShellError> {
    let envp = env.envp();
    let mut report = PipelineReport::default();
    let mut children: Vec<(String, Pid)> = Vec::new();
    let mut failure = None;

    // Read end feeding the next stage; `None` means the pipeline's own stdin.
    let mut input: Option<OwnedFd> = None;

    for stage in pipeline.stages() {
        // Stages discarded by the parser take no part and aren't reported.
        if stage.is_empty() {
            tracing::debug!("skipping discarded stage");
            continue;
        }

        let prepared = match PreparedStage::new(stage, env, search_path_var) {
            Ok(prepared) => prepared,
            Err(reason) => {
                tracing::info!(stage = %stage.name, %reason, "skipping pipeline stage");
                report.skipped.push(SkippedStage {
                    name: stage.name.clone(),
                    reason,
                });
                continue;
            }
        };

        let has_successor = stage
            .next
            .as_deref()
            .is_some_and(|next| next.stages().any(|later| !later.is_empty()));
        let pipe = if has_successor {
            match io::pipe() {
                Ok((reader, writer)) => Some((OwnedFd::from(reader), OwnedFd::from(writer))),
                Err(err) => {
                    failure = Some(ShellError::Io(err));
                    break;
                }
            }
        } else {
            None
        };

        let stdin = input.as_ref().map_or(streams.stdin, AsRawFd::as_raw_fd);
        let (stdout, read_end) = match &pipe {
            Some((reader, writer)) => (writer.as_raw_fd(), Some(reader.as_raw_fd())),
            None => (streams.stdout, None),
        };

        let spawned = spawn_stage(&prepared, &envp, stdin, stdout, read_end);

        // The child has its own copies now: drop the input it consumed and the
        // write end it writes to, keeping only the read end for the next stage.
        input = pipe.map(|(reader, _writer)| reader);

        match spawned {
            Ok(pid) => children.push((prepared.name, pid)),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }
    drop(input);

    for (name, pid) in children {
        match reap(pid) {
            Ok(code) => {
                tracing::debug!(stage = %name, %pid, code, "stage finished");
                report.statuses.push((name, code));
            }
            Err(err) => {
                tracing::warn!(stage = %name, %pid, %err, "failed to wait for stage");
                failure.get_or_insert(ShellError::Sys(err));
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_children() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_to_file(line: &str) -> (PipelineReport, String) {
        let _lock = lock_children();
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("stdout");
        let stdin = File::open("/dev/null").unwrap();
        let stdout = File::create(&out_path).unwrap();
        let env = Environment::new();

        let streams = StageIo {
            stdin: stdin.as_raw_fd(),
            stdout: stdout.as_raw_fd(),
        };
        let report = execute(&parse(line), &env, "PATH", streams).unwrap();
        (report, fs::read_to_string(&out_path).unwrap())
    }

    #[test]
    fn test_single_stage_runs_and_reports_status() {
        let (report, out) = run_to_file("echo hello world");
        assert_eq!(out, "hello world\n");
        assert_eq!(report.last_status(), Some(0));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_exit_codes_are_propagated() {
        let (report, _) = run_to_file("false");
        assert_eq!(report.last_status(), Some(1));
    }

    #[test]
    fn test_three_stage_pipeline_counts_one_line() {
        let (report, out) = run_to_file("echo a | cat | wc -l");
        assert_eq!(out.trim(), "1");
        assert_eq!(report.statuses.len(), 3);
        assert!(report.statuses.iter().all(|(_, code)| *code == 0));
    }

    #[test]
    fn test_unresolved_middle_stage_is_skipped() {
        let (report, out) = run_to_file("echo passthrough | no-such-command-pipesh | cat");
        assert_eq!(out, "passthrough\n");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "no-such-command-pipesh");
        assert!(matches!(report.skipped[0].reason, ShellError::CommandNotFound(_)));
        let ran: Vec<&str> = report.statuses.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(ran, ["echo", "cat"]);
    }

    #[test]
    fn test_background_flag_still_waits() {
        let (report, out) = run_to_file("echo bg &");
        assert_eq!(out, "bg\n");
        assert_eq!(report.last_status(), Some(0));
    }

    #[test]
    fn test_missing_input_file_fails_only_the_child() {
        let (report, out) = run_to_file("cat < /no/such/input/file");
        assert_eq!(out, "");
        assert_eq!(report.last_status(), Some(REDIRECT_FAILURE));
    }

    #[test]
    fn test_exec_failure_exits_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken");
        fs::write(&script, "#!/no/such/interpreter\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let (report, out) = run_to_file(&format!("{} | echo after", script.display()));
        assert_eq!(out, "after\n");
        assert_eq!(report.statuses[0].1, EXEC_FAILURE);
        assert_eq!(report.last_status(), Some(0));
    }

    #[test]
    fn test_discarded_tail_stage_is_skipped_silently() {
        let (report, out) = run_to_file("echo hi | cat >");
        assert_eq!(out, "hi\n");
        assert!(report.skipped.is_empty());
        let ran: Vec<&str> = report.statuses.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(ran, ["echo"]);
        assert_eq!(report.last_status(), Some(0));
    }

    #[test]
    fn test_discarded_head_stage_keeps_the_rest() {
        let (report, out) = run_to_file("cat < | echo tail");
        assert_eq!(out, "tail\n");
        assert!(report.skipped.is_empty());
        assert_eq!(report.statuses.len(), 1);
    }

    #[test]
    fn test_unresolvable_single_stage_spawns_nothing() {
        let (report, out) = run_to_file("no-such-command-pipesh arg");
        assert_eq!(out, "");
        assert!(report.statuses.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }
}
