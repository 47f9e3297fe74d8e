//! Screen layout and the periodic renderer.
//!
//! The screen is split into a message region on top and a bordered input
//! box on the bottom `INPUT_BOX_HEIGHT` rows. The renderer redraws on a
//! fixed interval and whenever the buffer or the input line changes.

use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use tokio_util::sync::CancellationToken;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::buffer::SharedBuffer;
use super::input::InputLine;
use crate::config::INPUT_BOX_HEIGHT;
use crate::terminal::terminal_size;

const INPUT_LABEL: &str = "Input: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub rows: u16,
    pub cols: u16,
}

impl Layout {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Current terminal size, or 24x80 when it cannot be queried.
    pub fn detect() -> Self {
        let (rows, cols) = terminal_size().unwrap_or((24, 80));
        Self::new(rows, cols)
    }

    /// Rows available to messages.
    pub fn content_height(&self) -> u16 {
        self.rows.saturating_sub(INPUT_BOX_HEIGHT)
    }

    /// First row of the input box.
    pub fn input_top(&self) -> u16 {
        self.content_height()
    }
}

fn printable(c: char) -> char {
    if c.is_control() {
        ' '
    } else {
        c
    }
}

/// Fit a line into `width` terminal columns for display. Control characters
/// are replaced with spaces so they cannot move the cursor. A wide character
/// that would straddle the edge is left out.
pub fn fit(line: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in line.chars().map(printable) {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

/// The trailing part of `text` that fits in `width` columns, so the cursor
/// end stays visible.
fn fit_tail(text: &str, width: usize) -> String {
    let mut tail = Vec::new();
    let mut used = 0;
    for c in text.chars().rev().map(printable) {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        tail.push(c);
    }
    tail.into_iter().rev().collect()
}

pub struct Renderer<W: Write> {
    out: W,
    buffer: SharedBuffer,
    input: InputLine,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, buffer: SharedBuffer, input: InputLine) -> Self {
        Self { out, buffer, input }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Redraw the whole screen for `layout`.
    ///
    /// Lines are copied out of the buffer first; all terminal I/O happens
    /// after the buffer lock is released.
    pub fn draw(&mut self, layout: Layout) -> io::Result<()> {
        let height = layout.content_height();
        let width = layout.cols as usize;
        let visible = self.buffer.tail(height as usize);
        let prompt = self.input.text();

        for row in 0..height {
            queue!(self.out, MoveTo(0, row))?;
            if let Some(line) = visible.get(row as usize) {
                queue!(self.out, Print(fit(line, width)))?;
            }
            queue!(self.out, Clear(ClearType::UntilNewLine))?;
        }

        if layout.rows >= INPUT_BOX_HEIGHT && width >= 2 {
            let top = layout.input_top();
            let inner = width - 2;
            let border = format!("+{}+", "-".repeat(inner));
            let field = fit_tail(&prompt, inner.saturating_sub(INPUT_LABEL.len() + 1));
            let body = fit(&format!(" {INPUT_LABEL}{field}"), inner);
            let padding = inner.saturating_sub(body.width());

            queue!(
                self.out,
                MoveTo(0, top),
                Print(&border),
                MoveTo(0, top + 1),
                Print(format!("|{body}{}|", " ".repeat(padding))),
                MoveTo(0, top + 2),
                Print(&border),
            )?;
        }

        self.out.flush()
    }

    /// Redraw until `stop` is cancelled. The stop token is checked on every
    /// iteration, so the loop exits within one interval.
    pub async fn run(mut self, stop: CancellationToken, interval: Duration) -> io::Result<W> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.buffer.changed() => {}
                _ = self.input.changed() => {}
            }
            if stop.is_cancelled() {
                break;
            }
            self.draw(Layout::detect())?;
        }
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(buffer: &SharedBuffer, input: &InputLine, layout: Layout) -> String {
        let mut renderer = Renderer::new(Vec::new(), buffer.clone(), input.clone());
        renderer.draw(layout).unwrap();
        String::from_utf8_lossy(&renderer.into_inner()).into_owned()
    }

    #[test]
    fn layout_reserves_input_box() {
        let layout = Layout::new(24, 80);
        assert_eq!(layout.content_height(), 21);
        assert_eq!(layout.input_top(), 21);
        assert_eq!(Layout::new(2, 80).content_height(), 0);
    }

    #[test]
    fn fit_truncates_and_strips_control_chars() {
        assert_eq!(fit("hello world", 5), "hello");
        assert_eq!(fit("a\tb\x1b[2J", 10), "a b [2J");
        assert_eq!(fit("", 3), "");
    }

    #[test]
    fn fit_counts_terminal_columns() {
        assert_eq!(fit("你好世界", 5), "你好");
        assert_eq!(fit("你好世界", 8), "你好世界");
        assert_eq!(fit_tail("你好世界", 5), "世界");
        assert_eq!(fit_tail("ab你", 3), "b你");
    }

    #[test]
    fn wide_input_stays_inside_the_box() {
        let input = InputLine::new();
        for c in "这是一个很长的中文输入行".chars() {
            input.push(c);
        }
        let cols = 20;
        let output = render(&SharedBuffer::new(), &input, Layout::new(6, cols));

        let start = output.find("| Input: ").expect("input row drawn");
        let row = output[start..].split('\x1b').next().unwrap();
        assert_eq!(row.width(), cols as usize);
        assert!(row.ends_with('|'));
        assert!(row.contains("输入行"));
    }

    #[test]
    fn view_shows_only_most_recent_lines() {
        let buffer = SharedBuffer::new();
        for i in 0..30 {
            buffer.append(format!("line-{i:03}"));
        }
        let output = render(&buffer, &InputLine::new(), Layout::new(13, 40));

        for i in 20..30 {
            assert!(output.contains(&format!("line-{i:03}")), "missing line-{i:03}");
        }
        for i in 0..20 {
            assert!(!output.contains(&format!("line-{i:03}")), "stale line-{i:03} drawn");
        }
        // The underlying sequence is untouched.
        assert_eq!(buffer.len(), 30);
    }

    #[test]
    fn input_box_shows_current_line() {
        let buffer = SharedBuffer::new();
        let input = InputLine::new();
        for c in "typing".chars() {
            input.push(c);
        }
        let output = render(&buffer, &input, Layout::new(10, 40));
        assert!(output.contains("Input: typing"));
        assert!(output.contains(&format!("+{}+", "-".repeat(38))));
    }

    #[test]
    fn tiny_terminal_does_not_panic() {
        let buffer = SharedBuffer::new();
        buffer.append("hello");
        render(&buffer, &InputLine::new(), Layout::new(1, 1));
        render(&buffer, &InputLine::new(), Layout::new(0, 0));
        render(&buffer, &InputLine::new(), Layout::new(3, 2));
    }

    #[tokio::test]
    async fn run_exits_when_stopped() {
        let stop = CancellationToken::new();
        let renderer = Renderer::new(Vec::new(), SharedBuffer::new(), InputLine::new());
        let handle = tokio::spawn(renderer.run(stop.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("renderer should stop promptly")
            .unwrap();
        assert!(result.is_ok());
    }
}
