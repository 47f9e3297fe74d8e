//! Local input capture.
//!
//! [`InputLoop`] pulls whole lines from a blocking [`LineSource`], stops on
//! the `:q` sentinel, and hands everything else to a [`Dispatch`] without
//! waiting for the network.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::INPUT_MAX_CHARS;

/// Typing this line (any case) exits the client.
pub const EXIT_COMMAND: &str = ":q";

pub fn is_exit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case(EXIT_COMMAND)
}

/// The line currently being edited, shared with the renderer.
#[derive(Clone, Default)]
pub struct InputLine {
    text: Arc<Mutex<String>>,
    changed: Arc<Notify>,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a character unless the line is already at `INPUT_MAX_CHARS`.
    pub fn push(&self, c: char) -> bool {
        let mut text = self.text.lock();
        if text.chars().count() >= INPUT_MAX_CHARS {
            return false;
        }
        text.push(c);
        drop(text);
        self.changed.notify_one();
        true
    }

    pub fn pop(&self) {
        self.text.lock().pop();
        self.changed.notify_one();
    }

    pub fn clear(&self) {
        self.text.lock().clear();
        self.changed.notify_one();
    }

    /// Take the finished line, leaving the input empty.
    pub fn take(&self) -> String {
        let line = std::mem::take(&mut *self.text.lock());
        self.changed.notify_one();
        line
    }

    pub fn text(&self) -> String {
        self.text.lock().clone()
    }

    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

/// A blocking source of input lines.
///
/// `Ok(None)` means input is exhausted. An `InvalidData` error means the
/// current line could not be decoded; the loop skips it and keeps reading.
pub trait LineSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Lines from any buffered reader (piped stdin, tests).
pub struct ReaderLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ReaderLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> LineSource for ReaderLines<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        String::from_utf8(std::mem::take(&mut self.buf))
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Line editor over crossterm key events. Requires raw mode.
///
/// Enter submits, Backspace deletes, Esc clears the line. Ctrl+C and
/// Ctrl+D end input. Polls `stop` between events so it returns promptly
/// when the client shuts down for another reason.
pub struct TerminalLines {
    line: InputLine,
    stop: CancellationToken,
}

impl TerminalLines {
    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(line: InputLine, stop: CancellationToken) -> Self {
        Self { line, stop }
    }
}

impl LineSource for TerminalLines {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.stop.is_cancelled() {
                return Ok(None);
            }
            if !event::poll(Self::POLL_INTERVAL)? {
                continue;
            }
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            else {
                continue;
            };

            match apply_key(&self.line, code, modifiers) {
                KeyOutcome::Submit(line) => return Ok(Some(line)),
                KeyOutcome::EndOfInput => return Ok(None),
                KeyOutcome::Edited => {}
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Submit(String),
    EndOfInput,
    Edited,
}

/// Apply one key press to `line`. Other Ctrl chords are ignored rather than
/// typed as their bare letter.
fn apply_key(line: &InputLine, code: KeyCode, modifiers: KeyModifiers) -> KeyOutcome {
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);
    match code {
        KeyCode::Enter => return KeyOutcome::Submit(line.take()),
        KeyCode::Char('c' | 'd') if ctrl => return KeyOutcome::EndOfInput,
        KeyCode::Char(_) if ctrl => {}
        KeyCode::Char(c) => {
            line.push(c);
        }
        KeyCode::Backspace => line.pop(),
        KeyCode::Esc => line.clear(),
        _ => {}
    }
    KeyOutcome::Edited
}

/// Where non-sentinel lines go.
pub trait Dispatch {
    fn dispatch(&self, line: String);
}

impl<F: Fn(String)> Dispatch for F {
    fn dispatch(&self, line: String) {
        self(line)
    }
}

/// Why the input loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum InputExit {
    /// The operator typed the exit command.
    Sentinel,
    /// The source ran out of input (EOF, Ctrl+C, or the client stopped).
    EndOfInput,
}

pub struct InputLoop<S> {
    source: S,
}

impl<S: LineSource> InputLoop<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Read and dispatch lines until the sentinel or end of input.
    ///
    /// Undecodable lines are skipped. Any other read error ends the loop
    /// and is returned.
    pub fn run(&mut self, dispatch: &dyn Dispatch) -> io::Result<InputExit> {
        loop {
            match self.source.next_line() {
                Ok(Some(line)) if is_exit_command(&line) => return Ok(InputExit::Sentinel),
                Ok(Some(line)) => dispatch.dispatch(line),
                Ok(None) => return Ok(InputExit::EndOfInput),
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    tracing::debug!(error = %e, "skipping undecodable input line");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
