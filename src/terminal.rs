use std::io::Write;

use crossterm::{
    cursor,
    execute,
    terminal::{self, disable_raw_mode, enable_raw_mode, size},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("failed to enable raw mode: {0}")]
    EnableRawMode(#[source] std::io::Error),

    #[error("failed to enter alternate screen: {0}")]
    AltScreen(#[source] std::io::Error),
}

/// RAII guard for terminal raw mode.
///
/// When created, enables raw mode on the terminal. When dropped (even on panic),
/// restores the terminal to its previous state.
///
/// Raw mode lets the input loop see individual keystrokes so it can edit the
/// input line itself while the renderer owns the rest of the screen.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn new() -> Result<Self, TerminalError> {
        enable_raw_mode().map_err(TerminalError::EnableRawMode)?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// RAII guard for the alternate screen. The previous screen contents and
/// cursor visibility are restored on drop.
pub struct ScreenGuard {
    _private: (),
}

impl ScreenGuard {
    pub fn new() -> Result<Self, TerminalError> {
        let mut stdout = std::io::stdout();
        execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)
            .map_err(TerminalError::AltScreen)?;
        Ok(Self { _private: () })
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let mut stdout = std::io::stdout();
        let _ = execute!(stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = stdout.flush();
    }
}

/// Get the current terminal size.
///
/// Returns (rows, cols).
/// Note: crossterm::terminal::size() returns (cols, rows), so we swap them.
pub fn terminal_size() -> anyhow::Result<(u16, u16)> {
    let (cols, rows) = size()?;
    Ok((rows, cols))
}
