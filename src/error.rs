//! Error types and the error channel for checkpoint contexts.
//!
//! Every fallible operation returns [`Error`]. Before a failure is returned it is
//! also pushed onto an error stack, see [`push_error`].

use crate::context::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Number of records an error stack keeps before dropping the oldest.
const ERROR_STACK_DEPTH: usize = 128;

/// Broad error category, each with a stable status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    OutOfResource,
    NotFound,
    BadParameter,
    Permission,
    Config,
    /// Non-fatal condition; only ever appears in error records.
    Warning,
}

impl ErrorKind {
    /// Status code for this kind. Negative codes are failures, positive codes are
    /// warnings, zero is success.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Generic => -1,
            ErrorKind::OutOfResource => -2,
            ErrorKind::NotFound => -3,
            ErrorKind::BadParameter => -5,
            ErrorKind::Permission => -6,
            ErrorKind::Config => -7,
            ErrorKind::Warning => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Generic => "generic",
            ErrorKind::OutOfResource => "out_of_resource",
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadParameter => "bad_parameter",
            ErrorKind::Permission => "permission",
            ErrorKind::Config => "config",
            ErrorKind::Warning => "warning",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by context, configuration, discovery and element operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    #[error("Out of resources: {0}")]
    OutOfResource(String),

    #[error("{0}")]
    Generic(String),

    #[error("Could not find an io module for data root {data_root}")]
    ComponentNotFound { data_root: String },

    #[error("Configuration variable {key} of {object} is read-only")]
    ReadOnly { object: String, key: String },

    #[error("Unknown configuration variable {key} for {object}")]
    UnknownVariable { object: String, key: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadParameter(_) => ErrorKind::BadParameter,
            Error::OutOfResource(_) => ErrorKind::OutOfResource,
            Error::Generic(_) => ErrorKind::Generic,
            Error::ComponentNotFound { .. } => ErrorKind::NotFound,
            Error::ReadOnly { .. } => ErrorKind::Permission,
            Error::UnknownVariable { .. } => ErrorKind::NotFound,
            Error::ConfigNotFound(_) => ErrorKind::NotFound,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// One entry of an error stack
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Identifier of the context the error belongs to, if any
    pub context: Option<String>,
    /// Data root of the module that reported the error, if any
    pub module: Option<String>,
    /// Status reported by the underlying runtime or backend
    pub native_status: Option<i32>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(context) = &self.context {
            write!(f, " (context {})", context)?;
        }
        if let Some(module) = &self.module {
            write!(f, " (module {})", module)?;
        }
        if let Some(status) = self.native_status {
            write!(f, " (native status {})", status)?;
        }
        Ok(())
    }
}

/// Bounded stack of error records
#[derive(Debug)]
pub struct ErrorStack {
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorStack {
    pub const fn new() -> Self {
        Self {
            records: parking_lot::const_mutex(VecDeque::new()),
        }
    }

    pub fn push(&self, record: ErrorRecord) {
        let mut records = self.records.lock();
        if records.len() == ERROR_STACK_DEPTH {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Most recent record, left on the stack
    pub fn last(&self) -> Option<ErrorRecord> {
        self.records.lock().back().cloned()
    }

    /// Copy of all records, oldest first
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Remove and return all records, oldest first
    pub fn drain(&self) -> Vec<ErrorRecord> {
        self.records.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for ErrorStack {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_ERRORS: ErrorStack = ErrorStack::new();

/// The process-wide error stack
pub fn global_errors() -> &'static ErrorStack {
    &GLOBAL_ERRORS
}

/// Most recent error for `context`, or from the process-wide stack when `None`
pub fn last_error(context: Option<&Context>) -> Option<ErrorRecord> {
    match context {
        Some(context) => context.errors().last(),
        None => GLOBAL_ERRORS.last(),
    }
}

/// Remove and return every record for `context`, or of the process-wide stack
pub fn drain_errors(context: Option<&Context>) -> Vec<ErrorRecord> {
    match context {
        Some(context) => context.errors().drain(),
        None => GLOBAL_ERRORS.drain(),
    }
}

/// Log a failure and record it on the appropriate error stack.
///
/// Records go to the context's own stack until the context starts tearing
/// down, and to the process-wide stack after that (or when there is no
/// context). A context whose creation fails moves its records to the
/// process-wide stack before it is released.
pub fn push_error(
    context: Option<&Context>,
    kind: ErrorKind,
    module: Option<&str>,
    native_status: Option<i32>,
    message: impl Into<String>,
) {
    let record = ErrorRecord {
        kind,
        context: context.map(|c| c.identifier().to_string()),
        module: module.map(str::to_string),
        native_status,
        message: message.into(),
        timestamp: Utc::now(),
    };

    if kind == ErrorKind::Warning {
        warn!(
            context = record.context.as_deref().unwrap_or("-"),
            module = record.module.as_deref().unwrap_or("-"),
            "{}",
            record.message
        );
    } else {
        error!(
            context = record.context.as_deref().unwrap_or("-"),
            module = record.module.as_deref().unwrap_or("-"),
            kind = %kind,
            native_status = ?native_status,
            "{}",
            record.message
        );
    }

    match context {
        Some(context) if context.accepts_errors() => context.errors().push(record),
        _ => GLOBAL_ERRORS.push(record),
    }
}
