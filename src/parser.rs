//! Turns one line of input into a chain of [`Command`] stages.
//!
//! The grammar is deliberately flat: whitespace separates tokens, `|` starts the
//! next stage, `<`, `>` and `>>` name redirection targets (attached to the
//! operator or as the following token), and a trailing `&` or `?` marks the line
//! for background execution or autocompletion. There is no quoting beyond
//! stripping one pair of matching quotes that wraps a whole token.

use crate::command::{Command, RedirectKind};

const PIPE: &str = "|";
const BACKGROUND: &str = "&";
const AUTOCOMPLETE_SIGIL: char = '?';
const BACKGROUND_SIGIL: char = '&';

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Whitespace-separated tokens of a line, each paired with the byte offset just past it.
struct Tokens<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Self {
        Tokens { line, pos: 0 }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.line[self.pos..];
        let start = self.pos + rest.find(|c| !is_blank(c))?;
        let len = self.line[start..]
            .find(is_blank)
            .unwrap_or(self.line.len() - start);
        self.pos = start + len;
        Some((&self.line[start..self.pos], self.pos))
    }
}

/// Strips one pair of matching single or double quotes wrapping the whole token.
///
/// A token of exactly two quote characters yields an empty argument; a lone quote
/// character is kept as-is.
fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    match bytes {
        [first @ (b'"' | b'\''), .., last] if bytes.len() >= 2 && first == last => {
            &token[1..token.len() - 1]
        }
        _ => token,
    }
}

/// Splits a redirection token into its kind and the attached filename (possibly empty).
fn redirect_operator(token: &str) -> Option<(RedirectKind, &str)> {
    if let Some(rest) = token.strip_prefix(">>") {
        Some((RedirectKind::Append, rest))
    } else if let Some(rest) = token.strip_prefix('>') {
        Some((RedirectKind::Output, rest))
    } else {
        token
            .strip_prefix('<')
            .map(|rest| (RedirectKind::Input, rest))
    }
}

/// Parses a single stage. Returns the stage plus the untokenized text after a `|`, if any.
fn parse_stage(raw: &str) -> (Command, Option<&str>) {
    let line = raw.trim_matches(is_blank);

    let autocomplete_requested = line.ends_with(AUTOCOMPLETE_SIGIL);
    let background = line.ends_with(BACKGROUND_SIGIL);

    // The trailing sigil takes no part in tokenizing, so `ec?` names `ec` and
    // `sleep 1&` passes `1`.
    let scope = if autocomplete_requested {
        &line[..line.len() - AUTOCOMPLETE_SIGIL.len_utf8()]
    } else if background {
        &line[..line.len() - BACKGROUND_SIGIL.len_utf8()]
    } else {
        line
    };

    let mut tokens = Tokens::new(scope);
    let name = tokens.next().map(|(token, _)| token.to_string());

    let mut cmd = Command::new(name.unwrap_or_default());
    cmd.background = background;
    cmd.autocomplete_requested = autocomplete_requested;

    let mut remainder = None;
    // Set when a redirection operator has no filename, attached or following.
    let mut missing_target = None;

    while let Some((token, end)) = tokens.next() {
        if token == PIPE {
            remainder = Some(line[end..].trim_start_matches(is_blank));
            break;
        }

        if token == BACKGROUND {
            continue;
        }

        if let Some((kind, attached)) = redirect_operator(token) {
            let target = if attached.is_empty() {
                match tokens.next() {
                    // The pipe still separates stages; only this one is discarded.
                    Some((next, next_end)) if next == PIPE => {
                        missing_target = Some(kind);
                        remainder = Some(line[next_end..].trim_start_matches(is_blank));
                        break;
                    }
                    next => next.map(|(next, _)| next),
                }
            } else {
                Some(attached)
            };
            match target {
                Some(target) => cmd.redirects[kind.slot()] = Some(unquote(target).to_string()),
                None => missing_target = Some(kind),
            }
            continue;
        }

        cmd.arguments.push(unquote(token).to_string());
    }

    if let Some(kind) = missing_target {
        tracing::debug!(target: "parse", ?kind, line, "redirection without a target, stage discarded");
        cmd.name.clear();
        cmd.arguments = vec![String::new()];
    }

    (cmd, remainder)
}

/// Parses a raw input line into a pipeline.
///
/// Never fails: a blank line, or a stage whose redirection is missing its
/// filename, yields a stage with an empty name, which the executor treats as a
/// no-op.
pub fn parse(raw: &str) -> Command {
    let mut stages = Vec::new();
    let mut rest = Some(raw);
    while let Some(text) = rest {
        let (stage, remainder) = parse_stage(text);
        stages.push(stage);
        rest = remainder;
    }

    let mut next: Option<Box<Command>> = None;
    while let Some(mut stage) = stages.pop() {
        stage.next = next.take();
        if stages.is_empty() {
            tracing::debug!(target: "parse", stages = stage.stage_count(), name = %stage.name, "parsed line");
            return stage;
        }
        next = Some(Box::new(stage));
    }

    // `stages` always holds at least one entry.
    Command::new("")
}
