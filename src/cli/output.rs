//! Operator-facing progress output.
//!
//! Progress goes to stdout and problems to stderr. Markers are colored when
//! the stream is a terminal; `NO_COLOR`/`TERM=dumb` are honoured through
//! [`ColorChoice::Auto`].

use crate::error::{ErrorExt, Result};
use cyrup_termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::io::{self, IsTerminal, Write};

/// Output manager for colored terminal output
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
    stdout_color: ColorChoice,
    stderr_color: ColorChoice,
}

/// Colored prefix of a line.
struct Marker {
    text: &'static str,
    color: Color,
    bold: bool,
}

impl Marker {
    const fn new(text: &'static str, color: Color, bold: bool) -> Self {
        Self { text, color, bold }
    }

    fn spec(&self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(self.color)).set_bold(self.bold);
        spec
    }
}

const SECTION: Marker = Marker::new("==>", Color::Cyan, true);
const SUCCESS: Marker = Marker::new("  ✓", Color::Green, true);
const WARNING: Marker = Marker::new("warning:", Color::Yellow, true);
const ERROR: Marker = Marker::new("Error:", Color::Red, true);
const DETAIL: Marker = Marker::new("  →", Color::Cyan, false);

impl OutputManager {
    /// Creates an output manager.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            stdout_color: choice_for(io::stdout().is_terminal()),
            stderr_color: choice_for(io::stderr().is_terminal()),
        }
    }

    fn out(&self, marker: Option<&Marker>, line: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        let stream = StandardStream::stdout(self.stdout_color);
        write_line(&mut stream.lock(), marker, line).fs_context("writing to", "stdout")
    }

    fn err(&self, marker: &Marker, line: &str) -> Result<()> {
        let stream = StandardStream::stderr(self.stderr_color);
        write_line(&mut stream.lock(), Some(marker), line).fs_context("writing to", "stderr")
    }

    /// Print a section header
    pub fn section(&self, title: &str) -> Result<()> {
        self.out(None, "")?;
        self.out(Some(&SECTION), title)
    }

    /// Print a success line
    pub fn success(&self, message: &str) -> Result<()> {
        self.out(Some(&SUCCESS), message)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> Result<()> {
        self.out(None, &format!("    {message}"))
    }

    /// Print only in verbose mode
    pub fn verbose(&self, message: &str) -> Result<()> {
        if self.verbose {
            self.out(None, &format!("    {message}"))
        } else {
            Ok(())
        }
    }

    /// Print a warning to stderr
    pub fn warn(&self, message: &str) -> Result<()> {
        self.err(&WARNING, message)
    }

    /// Print an error to stderr
    pub fn error(&self, message: &str) -> Result<()> {
        self.err(&ERROR, message)
    }

    /// Print an indented line to stderr
    pub fn error_detail(&self, message: &str) -> Result<()> {
        self.err(&DETAIL, message)
    }
}

fn choice_for(is_terminal: bool) -> ColorChoice {
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

/// Writes `marker` in its color, then the uncolored `line`.
fn write_line<W: WriteColor>(w: &mut W, marker: Option<&Marker>, line: &str) -> io::Result<()> {
    if let Some(marker) = marker {
        w.set_color(&marker.spec())?;
        write!(w, "{}", marker.text)?;
        w.reset()?;
        if !line.is_empty() {
            write!(w, " ")?;
        }
    }
    writeln!(w, "{line}")
}
