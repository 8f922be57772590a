//! Context creation.

use super::discovery::discover_modules;
use super::selection::{CurrentModulePolicy, SelectionPolicy};
use super::{
    clamp_verbosity, surrender_errors, Context, Lifecycle, Mode, KEY_CHECKPOINT_SIZE,
    KEY_DATA_ROOTS, KEY_PRINT_STATISTICS, KEY_VERBOSE, MAX_DATA_ROOTS,
};
use crate::component::ComponentRegistry;
use crate::config::{self, ConfigValue, VarFlags};
use crate::distributed::{check_runtime, Communicator, DistributedRuntime, PrivateGroup};
use crate::error::{push_error, Error, ErrorKind};
use crate::logging::{context_log, VERBOSE_DEBUG_LOW, VERBOSE_ERROR};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

struct DistributedSetup<'a> {
    runtime: &'a dyn DistributedRuntime,
    group: Option<&'a dyn Communicator>,
}

/// Builder for [`Context`]
///
/// ```no_run
/// use ckptio::context::{destroy_context, ContextBuilder};
///
/// let context = ContextBuilder::new("restart")
///     .config_file("ckptio.toml")
///     .config_prefix("app")
///     .build()?;
/// let mut slot = Some(context);
/// destroy_context(&mut slot)?;
/// assert!(slot.is_none());
/// # Ok::<(), ckptio::error::Error>(())
/// ```
pub struct ContextBuilder<'a> {
    identifier: String,
    config_file: Option<PathBuf>,
    config_prefix: Option<String>,
    default_data_roots: Option<String>,
    registry: Option<Arc<ComponentRegistry>>,
    max_data_roots: usize,
    selection: Option<Box<dyn SelectionPolicy>>,
    distributed: Option<DistributedSetup<'a>>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            config_file: None,
            config_prefix: None,
            default_data_roots: None,
            registry: None,
            max_data_roots: MAX_DATA_ROOTS,
            selection: None,
            distributed: None,
        }
    }

    /// Read overrides from this file
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Only consider the file section named `prefix`
    pub fn config_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config_prefix = Some(prefix.into());
        self
    }

    /// Data roots used when neither the file nor the environment sets
    /// `context_data_roots`. Defaults to `posix:<current directory>`.
    pub fn default_data_roots(mut self, data_roots: impl Into<String>) -> Self {
        self.default_data_roots = Some(data_roots.into());
        self
    }

    /// Component registry to discover modules from. Defaults to
    /// [`ComponentRegistry::global`].
    pub fn registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Bound on the module table
    pub fn max_data_roots(mut self, max: usize) -> Self {
        self.max_data_roots = max;
        self
    }

    pub fn selection_policy(mut self, policy: Box<dyn SelectionPolicy>) -> Self {
        self.selection = Some(policy);
        self
    }

    /// Build a distributed context on `group`, or on the runtime's world group
    pub fn distributed(
        mut self,
        runtime: &'a dyn DistributedRuntime,
        group: Option<&'a dyn Communicator>,
    ) -> Self {
        self.distributed = Some(DistributedSetup { runtime, group });
        self
    }

    /// Create the context.
    ///
    /// In distributed mode this is collective over the process group.
    pub fn build(self) -> Result<Context, Error> {
        if let Some(setup) = &self.distributed {
            if let Err(e) = check_runtime(setup.runtime) {
                push_error(None, e.kind(), None, None, e.to_string());
                return Err(e);
            }
        }
        if self.identifier.is_empty() {
            let e = Error::BadParameter("Context identifier must not be empty".to_string());
            push_error(None, e.kind(), None, None, e.to_string());
            return Err(e);
        }
        if self.max_data_roots == 0 {
            let e = Error::BadParameter("Module table capacity must be at least 1".to_string());
            push_error(None, e.kind(), None, None, e.to_string());
            return Err(e);
        }

        let mode = if self.distributed.is_some() {
            Mode::Distributed
        } else {
            Mode::SingleProcess
        };
        let selection = self
            .selection
            .unwrap_or_else(|| Box::new(CurrentModulePolicy));
        let mut context = Context::alloc(self.identifier, mode, selection);

        if let Some(setup) = self.distributed {
            let source = setup.group.unwrap_or_else(|| setup.runtime.world());
            match PrivateGroup::duplicate(source) {
                Ok(group) => {
                    context.identity = group.identity();
                    context.group = Some(group);
                }
                Err(e) => {
                    push_error(
                        Some(&context),
                        ErrorKind::OutOfResource,
                        None,
                        Some(e.code),
                        format!("Error duplicating process group handle: {}", e.message),
                    );
                    return Err(abort(
                        context,
                        Error::OutOfResource(format!(
                            "Could not duplicate process group handle: {}",
                            e
                        )),
                    ));
                }
            }
        }

        let registry = self.registry.unwrap_or_else(ComponentRegistry::global);
        let setup = CommonSetup {
            registry,
            config_file: self.config_file.as_deref(),
            config_prefix: self.config_prefix.as_deref(),
            default_data_roots: self.default_data_roots,
            max_data_roots: self.max_data_roots,
        };
        if let Err(e) = context.init_common(setup) {
            return Err(abort(context, e));
        }

        context.lifecycle = Lifecycle::Active;
        context_log!(
            context,
            VERBOSE_DEBUG_LOW,
            "Created new {} context with identifier {}",
            mode,
            context.identifier
        );
        Ok(context)
    }
}

struct CommonSetup<'p> {
    registry: Arc<ComponentRegistry>,
    config_file: Option<&'p Path>,
    config_prefix: Option<&'p str>,
    default_data_roots: Option<String>,
    max_data_roots: usize,
}

/// Release a partially built context and hand back the error that stopped it
fn abort(mut context: Context, error: Error) -> Error {
    surrender_errors(&context);
    let report = context.release();
    if !report.is_clean() {
        warn!(
            context = %context.identifier,
            failures = report.failures().len(),
            "Rollback of a failed context creation reported failures"
        );
    }
    error
}

fn cwd_data_roots() -> String {
    let cwd = std::env::current_dir().unwrap_or_else(|e| {
        warn!(error = %e, "Could not determine the working directory; using '.'");
        PathBuf::from(".")
    });
    format!("posix:{}", cwd.display())
}

impl Context {
    fn init_common(&mut self, setup: CommonSetup<'_>) -> Result<(), Error> {
        if let Err(e) = setup.registry.init() {
            push_error(
                Some(self),
                e.kind(),
                None,
                None,
                "Could not initialize the component interface",
            );
            return Err(e);
        }
        self.registry = Some(setup.registry.clone());

        if let Some(path) = setup.config_file {
            let entries = config::parse_file(path, setup.config_prefix, &self.identifier)
                .map_err(|e| {
                    push_error(Some(self), e.kind(), None, None, e.to_string());
                    e
                })?;
            let unbound = {
                let mut state = self.state.lock();
                config::apply_file_entries(&mut state.config, entries)
            };
            let unbound = unbound.map_err(|e| {
                push_error(Some(self), e.kind(), None, None, e.to_string());
                e
            })?;
            self.file_configuration = unbound;
        }

        let default_roots = setup.default_data_roots.unwrap_or_else(cwd_data_roots);
        self.bind_variables(default_roots).map_err(|e| {
            push_error(Some(self), e.kind(), None, None, e.to_string());
            e
        })?;
        context_log!(
            self,
            VERBOSE_DEBUG_LOW,
            "Set context verbosity to {}",
            self.verbosity()
        );

        let data_roots = self.data_roots();
        let modules = discover_modules(self, &setup.registry, &data_roots, setup.max_data_roots)?;
        self.modules = modules;
        self.state.lock().current_module = Some(0);
        Ok(())
    }

    fn bind_variables(&mut self, default_data_roots: String) -> Result<(), Error> {
        let file = &self.file_configuration;
        let mut state = self.state.lock();
        let config = &mut state.config;

        config.add(
            KEY_VERBOSE,
            ConfigValue::UInt32(VERBOSE_ERROR),
            None,
            "Debug level",
            VarFlags::NONE,
            file,
        )?;
        // data roots can not be changed after the context has been created
        config.add(
            KEY_DATA_ROOTS,
            ConfigValue::String(default_data_roots),
            None,
            "Comma-separated list of data roots to use with this context",
            VarFlags::READ_ONLY,
            file,
        )?;
        config.add(
            KEY_CHECKPOINT_SIZE,
            ConfigValue::UInt64(0),
            None,
            "Hint for expected checkpoint size in bytes (default: 0 -- auto)",
            VarFlags::NONE,
            file,
        )?;
        config.add(
            KEY_PRINT_STATISTICS,
            ConfigValue::Bool(false),
            None,
            "Print statistics to stdout when the context is closed (default: false)",
            VarFlags::NONE,
            file,
        )?;
        clamp_verbosity(config);
        drop(state);

        // entries consumed by a context variable are no longer pending
        let identifier = self.identifier.clone();
        self.file_configuration.retain(|kv| {
            ![KEY_VERBOSE, KEY_DATA_ROOTS, KEY_CHECKPOINT_SIZE, KEY_PRINT_STATISTICS]
                .iter()
                .any(|key| kv.matches(&identifier, key))
        });
        Ok(())
    }
}
