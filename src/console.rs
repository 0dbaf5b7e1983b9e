//! Console output helpers shared by the session and the indicator.

use crossterm::{
    cursor::MoveToColumn,
    queue,
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

pub const FAREWELL: &str = "👋 Goodbye!";

/// Cloneable handle to the process stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stdout;

impl Write for Stdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Move to the start of the current line and erase it.
pub fn clear_line<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    out.flush()
}

/// Whether stdout is attached to a terminal.
pub fn stdout_is_terminal() -> bool {
    atty::is(atty::Stream::Stdout)
}
