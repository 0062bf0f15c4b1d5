//! Logging and progress output for a translation run.
//!
//! [`Notifier`] puts `env_logger` (text logs) and `indicatif` (a spinner) behind one verbosity
//! switch:
//! - [`VerbosityLevel::Quiet`] → a live spinner carries `info` messages; warnings and errors are
//!   still logged, printed above the spinner.
//! - [`VerbosityLevel::Info`]/[`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`] → plain logs.
//!
//! The translation engine reports every recoverable problem through [`Notifier::warn`], so a
//! partially translated image is always visible on stderr even in quiet mode.

use env_logger::Env;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Record};
use std::cell::RefCell;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, only warnings and errors as text
    Info = 1,  // Text logs at info level
    Debug = 2, // Text logs at debug level
    Trace = 3, // Text logs at trace level
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    pub fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    logger: env_logger::Logger,
    multi_progress: Option<MultiProgress>,
    active_spinner: RefCell<Option<ProgressBar>>,
}

impl Notifier {
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let logger = env_logger::Builder::from_env(Env::default())
            .filter_level(verbosity.to_log_level())
            .build();

        let multi_progress = if verbosity == VerbosityLevel::Quiet {
            Some(MultiProgress::new())
        } else {
            None
        };

        Self {
            verbosity,
            logger,
            multi_progress,
            active_spinner: RefCell::new(None),
        }
    }

    /// A notifier that never draws a spinner; used by tests and library callers.
    pub fn silent() -> Self {
        let logger = env_logger::Builder::new()
            .filter_level(LevelFilter::Off)
            .build();

        Self {
            verbosity: VerbosityLevel::Quiet,
            logger,
            multi_progress: None,
            active_spinner: RefCell::new(None),
        }
    }

    pub fn info(&self, message: &str) {
        match self.verbosity {
            VerbosityLevel::Quiet => {
                if self.active_spinner.borrow().is_none() {
                    if let Some(multi_progress) = &self.multi_progress {
                        let spinner = multi_progress.add(ProgressBar::new_spinner());
                        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                            spinner.set_style(style);
                        }
                        spinner.enable_steady_tick(Duration::from_millis(100));

                        *self.active_spinner.borrow_mut() = Some(spinner);
                    }
                }

                if let Some(spinner) = self.active_spinner.borrow().as_ref() {
                    spinner.set_message(message.to_string());
                }
            }
            _ => self.log(Level::Info, message),
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Debug, message);
        }
    }

    pub fn trace(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Trace, message);
        }
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Stops the spinner, leaving `message` as its last line.
    pub fn finish(&self, message: &str) {
        let spinner = self.active_spinner.borrow_mut().take();
        match spinner {
            Some(spinner) => spinner.finish_with_message(message.to_string()),
            None => self.info(message),
        }
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }

    fn log(&self, level: Level, message: &str) {
        let emit = || {
            self.logger.log(
                &Record::builder()
                    .args(format_args!("{}", message))
                    .level(level)
                    .target(module_path!())
                    .build(),
            )
        };

        // Keep text lines from being drawn over by the spinner.
        match &self.multi_progress {
            Some(multi_progress) if self.active_spinner.borrow().is_some() => {
                multi_progress.suspend(emit)
            }
            _ => emit(),
        }
    }
}
