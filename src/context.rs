//! Context lifecycle.
//!
//! A [`Context`] is the top-level handle of one checkpoint/restart session. It is
//! built by [`ContextBuilder`] (or the `create_*` helpers) and exists only in a
//! fully initialized state: configuration applied, distributed identity
//! resolved, modules bound. Any failure during creation releases everything
//! acquired so far before the error is returned.
//!
//! Destruction goes through [`destroy_context`], which always leaves the
//! caller's slot empty and runs every teardown step even when earlier steps
//! fail. A context dropped without being destroyed is torn down the same way.

use crate::component::{ComponentRegistry, Module};
use crate::config::{ConfigKv, ConfigRegistry, ConfigValue, ConfigVar};
use crate::distributed::{Communicator, DistributedRuntime, PrivateGroup, ProcessIdentity};
use crate::error::{global_errors, push_error, Error, ErrorRecord, ErrorStack};
use crate::logging::{context_log, tracing_level, VERBOSE_DEBUG_LOW, VERBOSE_ERROR, VERBOSE_MAX};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, trace, warn, Level};

mod builder;
mod discovery;
mod selection;
mod teardown;

pub use builder::ContextBuilder;
pub use discovery::split_data_roots;
pub use selection::{CurrentModulePolicy, SelectionPolicy};
pub use teardown::{TeardownFailure, TeardownReport, TeardownStep};

/// Default bound on the number of data roots a context binds
pub const MAX_DATA_ROOTS: usize = 64;

pub const KEY_VERBOSE: &str = "context_verbose";
pub const KEY_DATA_ROOTS: &str = "context_data_roots";
pub const KEY_CHECKPOINT_SIZE: &str = "context_checkpoint_size";
pub const KEY_PRINT_STATISTICS: &str = "context_print_statistics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SingleProcess,
    Distributed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::SingleProcess => f.write_str("single"),
            Mode::Distributed => f.write_str("distributed"),
        }
    }
}

/// Advice returned by [`query_checkpoint_hint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointHint {
    MustCheckpoint,
    NotNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Creating,
    Active,
    Destroyed,
}

/// Mutable context state, guarded by the context lock
#[derive(Debug)]
struct ContextState {
    config: ConfigRegistry,
    /// `None` means unset; selection resets it to module 0
    current_module: Option<usize>,
}

/// One checkpoint/restart session bound to one or more data roots
pub struct Context {
    identifier: String,
    mode: Mode,
    identity: ProcessIdentity,
    state: Mutex<ContextState>,
    modules: Vec<Box<dyn Module>>,
    selection: Box<dyn SelectionPolicy>,
    group: Option<PrivateGroup>,
    file_configuration: Vec<ConfigKv>,
    registry: Option<Arc<ComponentRegistry>>,
    errors: ErrorStack,
    created_at: DateTime<Utc>,
    lifecycle: Lifecycle,
}

impl Context {
    fn alloc(identifier: String, mode: Mode, selection: Box<dyn SelectionPolicy>) -> Self {
        let config = ConfigRegistry::init(identifier.clone());
        Self {
            identifier,
            mode,
            identity: ProcessIdentity::SINGLE,
            state: Mutex::new(ContextState {
                config,
                current_module: None,
            }),
            modules: Vec::new(),
            selection,
            group: None,
            file_configuration: Vec::new(),
            registry: None,
            errors: ErrorStack::new(),
            created_at: Utc::now(),
            lifecycle: Lifecycle::Creating,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn rank(&self) -> u32 {
        self.identity.rank
    }

    pub fn size(&self) -> u32 {
        self.identity.size
    }

    pub fn identity(&self) -> ProcessIdentity {
        self.identity
    }

    /// The context's private process-group handle (distributed mode only)
    pub fn communicator(&self) -> Option<&dyn Communicator> {
        self.group.as_ref().map(PrivateGroup::communicator)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub(crate) fn accepts_errors(&self) -> bool {
        self.lifecycle != Lifecycle::Destroyed
    }

    pub fn errors(&self) -> &ErrorStack {
        &self.errors
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.errors.last()
    }

    pub fn verbosity(&self) -> u32 {
        self.state
            .lock()
            .config
            .get(KEY_VERBOSE)
            .and_then(ConfigValue::as_u32)
            .unwrap_or(VERBOSE_ERROR)
    }

    /// Expected checkpoint size in bytes; 0 lets the backends decide
    pub fn checkpoint_size(&self) -> u64 {
        self.state
            .lock()
            .config
            .get(KEY_CHECKPOINT_SIZE)
            .and_then(ConfigValue::as_u64)
            .unwrap_or(0)
    }

    pub fn print_statistics(&self) -> bool {
        self.state
            .lock()
            .config
            .get(KEY_PRINT_STATISTICS)
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    /// The data-roots specification the modules were discovered from
    pub fn data_roots(&self) -> String {
        self.state
            .lock()
            .config
            .get(KEY_DATA_ROOTS)
            .and_then(ConfigValue::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn config_value(&self, key: &str) -> Option<ConfigValue> {
        self.state.lock().config.get(key).cloned()
    }

    /// Snapshot of every variable bound for this context
    pub fn config_vars(&self) -> Vec<ConfigVar> {
        self.state.lock().config.vars().to_vec()
    }

    /// File-sourced entries not bound to any context variable
    pub fn file_configuration(&self) -> &[ConfigKv] {
        &self.file_configuration
    }

    /// Change a context configuration variable.
    ///
    /// Read-only variables (`context_data_roots`) are rejected with
    /// [`Error::ReadOnly`] and keep their value.
    pub fn set_config(&self, key: &str, value: ConfigValue) -> Result<(), Error> {
        let result = {
            let mut state = self.state.lock();
            let result = state.config.set(key, value);
            if result.is_ok() && key == KEY_VERBOSE {
                clamp_verbosity(&mut state.config);
            }
            result
        };
        if let Err(e) = &result {
            push_error(Some(self), e.kind(), None, None, e.to_string());
        }
        result
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Bound modules in data-root order
    pub fn modules(&self) -> impl Iterator<Item = &dyn Module> + '_ {
        self.modules.iter().map(|m| m.as_ref())
    }

    pub fn checkpoint_hint(&self) -> CheckpointHint {
        CheckpointHint::MustCheckpoint
    }

    pub(crate) fn log(&self, level: u32, args: fmt::Arguments<'_>) {
        if self.verbosity() < level {
            return;
        }
        let level = tracing_level(level);
        let context = self.identifier.as_str();
        if level == Level::ERROR {
            error!(context, rank = self.identity.rank, "{}", args);
        } else if level == Level::WARN {
            warn!(context, rank = self.identity.rank, "{}", args);
        } else if level == Level::DEBUG {
            debug!(context, rank = self.identity.rank, "{}", args);
        } else {
            trace!(context, rank = self.identity.rank, "{}", args);
        }
    }

    /// Consume the context, running the full teardown.
    pub fn destroy(self) -> Result<(), Error> {
        let mut slot = Some(self);
        destroy_context(&mut slot)
    }

    /// One-line summary printed at teardown when `context_print_statistics` is set
    pub fn statistics_summary(&self) -> String {
        let open_for = Utc::now() - self.created_at;
        let roots: Vec<&str> = self.modules().map(|m| m.data_root()).collect();
        format!(
            "ckptio: context {} (rank {} of {}) closed after {:.3}s, {} module(s): {}",
            self.identifier,
            self.identity.rank,
            self.identity.size,
            open_for.num_milliseconds() as f64 / 1000.0,
            roots.len(),
            roots.join(",")
        )
    }
}

fn clamp_verbosity(config: &mut ConfigRegistry) {
    let verbose = config
        .get(KEY_VERBOSE)
        .and_then(ConfigValue::as_u32)
        .unwrap_or(VERBOSE_ERROR);
    if verbose > VERBOSE_MAX {
        // not read-only, cannot fail
        let _ = config.set(KEY_VERBOSE, ConfigValue::UInt32(VERBOSE_MAX));
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("identifier", &self.identifier)
            .field("mode", &self.mode)
            .field("identity", &self.identity)
            .field("modules", &self.modules)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.lifecycle != Lifecycle::Destroyed {
            let report = self.release();
            if !report.is_clean() {
                warn!(
                    context = %self.identifier,
                    failures = report.failures().len(),
                    "Context dropped without destroy; teardown reported failures"
                );
            }
        }
    }
}

/// Create a single-process context.
pub fn create_single_process_context(
    config_file: Option<&Path>,
    config_prefix: Option<&str>,
    name: &str,
) -> Result<Context, Error> {
    let mut builder = ContextBuilder::new(name);
    if let Some(path) = config_file {
        builder = builder.config_file(path);
    }
    if let Some(prefix) = config_prefix {
        builder = builder.config_prefix(prefix);
    }
    builder.build()
}

/// Create a context bound to a process group.
///
/// `group` defaults to the runtime's world group. Collective: every member of
/// the group must call it.
pub fn create_distributed_context(
    runtime: &dyn DistributedRuntime,
    group: Option<&dyn Communicator>,
    config_file: Option<&Path>,
    config_prefix: Option<&str>,
    name: &str,
) -> Result<Context, Error> {
    let mut builder = ContextBuilder::new(name).distributed(runtime, group);
    if let Some(path) = config_file {
        builder = builder.config_file(path);
    }
    if let Some(prefix) = config_prefix {
        builder = builder.config_prefix(prefix);
    }
    builder.build()
}

/// Destroy the context held in `context`.
///
/// The slot is empty afterwards whatever happens. An empty slot is a no-op.
/// Every teardown step runs; the first failure is returned and all failures are
/// on the process-wide error stack.
pub fn destroy_context(context: &mut Option<Context>) -> Result<(), Error> {
    let Some(mut context) = context.take() else {
        return Ok(());
    };

    context_log!(
        context,
        VERBOSE_DEBUG_LOW,
        "Destroying context with identifier {}",
        context.identifier
    );
    let report = context.release();
    drop(context);
    report.into_result()
}

/// Whether the application should write a checkpoint now
pub fn query_checkpoint_hint(context: &Context) -> CheckpointHint {
    context.checkpoint_hint()
}

/// Move records collected during a failed creation to the process-wide stack
fn surrender_errors(context: &Context) {
    for record in context.errors.drain() {
        global_errors().push(record);
    }
}
