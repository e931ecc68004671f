//! Host diagnostics.
//!
//! [`TraceSink`] is the single diagnostic channel of the host:
//!
//! - **errors** are always written, either to a registered error writer or
//!   to stderr, and copied to the trace file when one is configured
//! - **info/verbose/warning** records are only written when tracing is
//!   enabled, filtered by verbosity
//! - **println** writes plain lines to stdout (usage text)
//!
//! Every output is buffered until [`TraceSink::flush`]. The process-wide
//! instance created by [`init`] is also the `log` crate's logger, so
//! modules that don't carry a sink reference can use `log::debug!` and
//! friends.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// Highest (most verbose) trace level.
pub const DEFAULT_VERBOSITY: u8 = 4;

/// How tracing was configured for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSettings {
    pub enabled: bool,
    /// 1 = errors, 2 = warnings, 3 = info, 4 = verbose.
    pub verbosity: u8,
    pub trace_file: Option<PathBuf>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            verbosity: DEFAULT_VERBOSITY,
            trace_file: None,
        }
    }
}

/// Redirect target for error messages.
pub type ErrorWriter = Arc<dyn Fn(&str) + Send + Sync>;

/// Boxed output target.
pub type Output = Box<dyn Write + Send>;

struct Outputs {
    stdout: BufWriter<Output>,
    stderr: BufWriter<Output>,
    /// Dedicated trace file; `None` means traces share stderr.
    trace_file: Option<BufWriter<Output>>,
}

impl Outputs {
    fn trace_target(&mut self) -> &mut BufWriter<Output> {
        match self.trace_file.as_mut() {
            Some(file) => file,
            None => &mut self.stderr,
        }
    }
}

/// The host's diagnostic sink.
pub struct TraceSink {
    enabled: bool,
    verbosity: u8,
    outputs: Mutex<Outputs>,
    error_writer: Mutex<Option<ErrorWriter>>,
}

impl TraceSink {
    /// Create a sink writing to the real stdout/stderr (and trace file).
    pub fn new(settings: &TraceSettings) -> Self {
        Self::with_outputs(settings, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Create a sink with explicit stdout/stderr targets.
    ///
    /// If the configured trace file cannot be opened, traces fall back to
    /// the stderr target.
    pub fn with_outputs(settings: &TraceSettings, stdout: Output, stderr: Output) -> Self {
        let trace_file = if settings.enabled {
            settings.trace_file.as_ref().and_then(|path| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .ok()
                    .map(|file| BufWriter::new(Box::new(file) as Output))
            })
        } else {
            None
        };

        Self {
            enabled: settings.enabled,
            verbosity: settings.verbosity,
            outputs: Mutex::new(Outputs {
                stdout: BufWriter::new(stdout),
                stderr: BufWriter::new(stderr),
                trace_file,
            }),
            error_writer: Mutex::new(None),
        }
    }

    /// A sink with tracing disabled, writing to the real streams.
    pub fn disabled() -> Self {
        Self::new(&TraceSettings::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Informational trace (verbosity 3+).
    pub fn info(&self, message: &str) {
        self.trace_at(3, message);
    }

    /// Verbose trace (verbosity 4).
    pub fn verbose(&self, message: &str) {
        self.trace_at(4, message);
    }

    /// Warning trace (verbosity 2+).
    pub fn warning(&self, message: &str) {
        self.trace_at(2, message);
    }

    fn trace_at(&self, level: u8, message: &str) {
        if !self.enabled || self.verbosity < level {
            return;
        }
        let mut outputs = self.outputs.lock();
        let _ = writeln!(outputs.trace_target(), "{}", message);
    }

    /// Report an error. Always emitted.
    pub fn error(&self, message: &str) {
        // Cloned out of the lock so a writer that logs can't deadlock.
        let writer = self.error_writer.lock().clone();
        match writer {
            Some(writer) => writer(message),
            None => {
                let _ = writeln!(self.outputs.lock().stderr, "{}", message);
            }
        }

        if self.enabled {
            if let Some(file) = self.outputs.lock().trace_file.as_mut() {
                let _ = writeln!(file, "{}", message);
            }
        }
    }

    /// Plain line on stdout.
    pub fn println(&self, message: &str) {
        let mut outputs = self.outputs.lock();
        let _ = writeln!(outputs.stdout, "{}", message);
    }

    /// Flush every buffered output.
    pub fn flush(&self) {
        let mut outputs = self.outputs.lock();
        let _ = outputs.stdout.flush();
        let _ = outputs.stderr.flush();
        if let Some(file) = outputs.trace_file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Install (or clear) the error writer, returning the previous one.
    pub fn set_error_writer(&self, writer: Option<ErrorWriter>) -> Option<ErrorWriter> {
        std::mem::replace(&mut *self.error_writer.lock(), writer)
    }

    pub fn has_error_writer(&self) -> bool {
        self.error_writer.lock().is_some()
    }

    /// `log` filter matching this sink's settings.
    pub fn max_level(&self) -> LevelFilter {
        if !self.enabled {
            return LevelFilter::Error;
        }
        match self.verbosity {
            0 | 1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            _ => LevelFilter::Trace,
        }
    }
}

impl Log for TraceSink {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        match record.level() {
            Level::Error => self.error(&message),
            Level::Warn => self.warning(&message),
            Level::Info => self.info(&message),
            Level::Debug | Level::Trace => self.verbose(&message),
        }
    }

    fn flush(&self) {
        TraceSink::flush(self);
    }
}

static GLOBAL: OnceCell<TraceSink> = OnceCell::new();

/// Initialize the process-wide sink and register it with `log`.
///
/// Later calls return the already initialized sink.
pub fn init(settings: &TraceSettings) -> &'static TraceSink {
    let sink = GLOBAL.get_or_init(|| TraceSink::new(settings));
    if log::set_logger(sink).is_ok() {
        log::set_max_level(sink.max_level());
    }
    sink
}

/// The process-wide sink, if [`init`] has run.
pub fn global() -> Option<&'static TraceSink> {
    GLOBAL.get()
}
