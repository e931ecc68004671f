//! Colored terminal output.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects `NO_COLOR` environment variable and `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Right-aligned green label followed by a message, one line.
    pub fn status(&mut self, label: &str, message: &str) {
        self.write_styled(&format!("{:>12}", label), Some(Color::Green), true);
        let _ = writeln!(self.stdout, " {}", message);
    }

    /// Right-aligned yellow label followed by a message, one line.
    pub fn warning(&mut self, label: &str, message: &str) {
        self.write_styled(&format!("{:>12}", label), Some(Color::Yellow), true);
        let _ = writeln!(self.stdout, " {}", message);
    }

    /// `key: value` line with a bold key.
    pub fn field(&mut self, key: &str, value: &str) {
        self.write_styled(&format!("{:<12}", format!("{}:", key)), None, true);
        let _ = writeln!(self.stdout, " {}", value);
    }

    /// Dim/gray text line.
    pub fn dim(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::White)).set_dimmed(true);
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    /// Write error message to stderr.
    pub fn stderr_error(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Red)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "error");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, ": {}", text);
    }
}
