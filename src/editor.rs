//! Byte-at-a-time line editor with history recall and a completion hook.
//!
//! The editor assumes the terminal is already in raw mode (see
//! [`crate::terminal::RawModeGuard`]); it does its own echoing.

use crate::history::{Direction, History};
use std::io::{self, Read, Write};

const TAB: u8 = 9;
const NEWLINE: u8 = b'\n';
const ESCAPE: u8 = 27;
const BRACKET: u8 = b'[';
const BACKSPACE: u8 = 127;
const ARROW_UP: u8 = b'A';
const ARROW_DOWN: u8 = b'B';

/// Erases one character cell to the left of the cursor.
const ERASE: &[u8] = b"\x08 \x08";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    Normal,
    SawEscape,
    SawBracket,
}

/// State the editor shares with the rest of the session.
#[derive(Debug, Default)]
pub struct EditorState {
    pub history: History,
    /// Completed command name waiting to replace the buffer on the next keystroke.
    pub pending_completion: Option<String>,
}

/// Reads lines from `input`, echoing edits to `output`.
pub struct LineEditor<R, W> {
    input: R,
    output: W,
    max_line_bytes: usize,
}

impl<R: Read, W: Write> LineEditor<R, W> {
    pub fn new(input: R, output: W, max_line_bytes: usize) -> Self {
        Self {
            input,
            output,
            max_line_bytes,
        }
    }

    /// Gives back the output stream, e.g. to inspect what was echoed.
    pub fn into_output(self) -> W {
        self.output
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Visually erases the whole buffer, one character at a time.
    fn erase(&mut self, buffer: &[u8]) -> io::Result<()> {
        for _ in String::from_utf8_lossy(buffer).chars() {
            self.output.write_all(ERASE)?;
        }
        Ok(())
    }

    fn replace(&mut self, buffer: &mut Vec<u8>, text: &str) -> io::Result<()> {
        self.erase(buffer)?;
        buffer.clear();
        buffer.extend_from_slice(text.as_bytes());
        self.output.write_all(buffer)
    }

    /// Reads one line.
    ///
    /// Tab submits the buffer with a trailing `?` so it is completed rather than
    /// run; up/down arrows recall history. The submitted line (without its newline)
    /// is recorded in `state.history` and returned. Returns `None` once input is
    /// exhausted and nothing was typed.
    pub fn read_line(&mut self, state: &mut EditorState) -> io::Result<Option<String>> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut escape = EscapeState::Normal;
        let mut saw_input = false;

        loop {
            self.output.flush()?;
            let Some(byte) = self.read_byte()? else {
                break;
            };
            saw_input = true;

            match escape {
                EscapeState::SawEscape => {
                    escape = if byte == BRACKET {
                        EscapeState::SawBracket
                    } else {
                        EscapeState::Normal
                    };
                    continue;
                }
                EscapeState::SawBracket => {
                    escape = EscapeState::Normal;
                    let direction = match byte {
                        ARROW_UP => Direction::Back,
                        ARROW_DOWN => Direction::Forward,
                        _ => continue,
                    };
                    if let Some(entry) = state.history.navigate(direction) {
                        let entry = entry.to_string();
                        self.replace(&mut buffer, &entry)?;
                    }
                    continue;
                }
                EscapeState::Normal => {}
            }

            match byte {
                TAB => {
                    buffer.push(b'?');
                    break;
                }
                BACKSPACE => {
                    if !buffer.is_empty() {
                        self.output.write_all(ERASE)?;
                        pop_char(&mut buffer);
                    }
                    continue;
                }
                ESCAPE => {
                    escape = EscapeState::SawEscape;
                    continue;
                }
                _ => {}
            }

            if let Some(completion) = state.pending_completion.take() {
                self.replace(&mut buffer, &completion)?;
            }

            self.output.write_all(&[byte])?;
            buffer.push(byte);

            if byte == NEWLINE || buffer.len() >= self.max_line_bytes {
                break;
            }
        }
        self.output.flush()?;

        if !saw_input {
            return Ok(None);
        }

        if buffer.last() == Some(&NEWLINE) {
            buffer.pop();
        }
        let line = String::from_utf8_lossy(&buffer).into_owned();
        state.history.record(&line);
        Ok(Some(line))
    }
}

/// Removes the last UTF-8 character from `buffer`.
fn pop_char(buffer: &mut Vec<u8>) {
    while let Some(byte) = buffer.pop() {
        // Stop once the leading byte of the character is gone.
        if byte & 0b1100_0000 != 0b1000_0000 {
            break;
        }
    }
}
