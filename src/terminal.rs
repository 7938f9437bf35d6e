use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use std::fs::File;
use std::io::{self, IsTerminal, Read, Stdin};
use std::os::fd::AsFd;

/// Puts a terminal into raw mode (no line buffering, no echo) for as long as the
/// guard lives. The previous settings are restored on drop.
///
/// When the descriptor is not a terminal the guard does nothing.
pub struct RawModeGuard<F: AsFd = Stdin> {
    fd: F,
    initial: Option<Termios>,
}

impl RawModeGuard {
    /// Raw mode on the shell's own stdin.
    pub fn enable() -> nix::Result<Self> {
        Self::on(io::stdin())
    }
}

impl<F: AsFd> RawModeGuard<F> {
    pub fn on(fd: F) -> nix::Result<Self> {
        if !fd.as_fd().is_terminal() {
            return Ok(Self { fd, initial: None });
        }

        let initial = termios::tcgetattr(fd.as_fd())?;
        let mut raw = initial.clone();
        raw.local_flags -= LocalFlags::ICANON | LocalFlags::ECHO;
        termios::tcsetattr(fd.as_fd(), SetArg::TCSANOW, &raw)?;

        Ok(Self {
            fd,
            initial: Some(initial),
        })
    }
}

impl<F: AsFd> Drop for RawModeGuard<F> {
    fn drop(&mut self) {
        if let Some(initial) = &self.initial {
            if let Err(err) = termios::tcsetattr(self.fd.as_fd(), SetArg::TCSANOW, initial) {
                tracing::warn!(%err, "failed to restore terminal mode");
            }
        }
    }
}

/// Unbuffered reader over the shell's stdin.
///
/// Reads go straight to the descriptor so that no input typed ahead for a child
/// process is swallowed by a userspace buffer.
pub struct TerminalInput {
    stdin: File,
}

impl TerminalInput {
    pub fn new() -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self {
            stdin: File::from(fd),
        })
    }
}

impl Read for TerminalInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buf)
    }
}
