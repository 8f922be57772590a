//! Component registry: process-wide catalog of backend components.
//!
//! A [`Component`] knows how to service data roots of one scheme (`posix:`) and
//! hands out a [`Module`] bound to a single data root. Contexts query the
//! registry during creation and own the modules they receive.
//!
//! The registry has an explicit `init`/`fini` lifecycle. It is reference counted:
//! each context calls `init` while it is being created and `fini` when it is
//! destroyed. The first `init` registers the built-in components.

use crate::context::Context;
use crate::error::Error;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub mod posix;

pub use posix::{PosixComponent, PosixModule};

/// A backend implementation that can produce modules for matching data roots
pub trait Component: Send + Sync {
    /// Human-readable component name
    fn name(&self) -> &str;

    /// Data-root scheme serviced by this component, without the trailing `:`
    fn scheme(&self) -> &str;

    /// Build a module for `data_root` on behalf of `context`
    fn query(&self, context: &Context, data_root: &str) -> Result<Box<dyn Module>, Error>;
}

/// A backend module bound to one data root of one context
pub trait Module: Send + Sync + fmt::Debug {
    /// Name of the component that produced this module
    fn component(&self) -> &str;

    /// The data-root specifier this module services
    fn data_root(&self) -> &str;

    /// Release the module's resources. Called exactly once, at context teardown
    /// or when discovery is rolled back.
    fn fini(&mut self) -> Result<(), Error>;
}

/// Split a data-root specifier into its scheme and location
pub fn split_scheme(data_root: &str) -> Option<(&str, &str)> {
    let (scheme, location) = data_root.split_once(':')?;
    if scheme.is_empty() {
        return None;
    }
    Some((scheme, location))
}

/// Catalog of components, queried by data-root specifier
pub struct ComponentRegistry {
    components: RwLock<Vec<Arc<dyn Component>>>,
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    references: usize,
    builtins_loaded: bool,
}

impl ComponentRegistry {
    /// Create an empty, uninitialized registry
    pub fn new() -> Self {
        Self {
            components: RwLock::new(Vec::new()),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// The process-wide registry used when a context is not given one explicitly
    pub fn global() -> Arc<ComponentRegistry> {
        static GLOBAL: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(ComponentRegistry::new()))
            .clone()
    }

    /// Take a reference on the registry, loading built-in components on first use
    pub fn init(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if !state.builtins_loaded {
            let mut components = self.components.write();
            if !components.iter().any(|c| c.scheme() == posix::SCHEME) {
                components.push(Arc::new(PosixComponent::new()));
            }
            state.builtins_loaded = true;
            debug!(components = components.len(), "Loaded built-in components");
        }
        state.references += 1;
        Ok(())
    }

    /// Drop a reference taken by [`init`](Self::init)
    pub fn fini(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.references == 0 {
            return Err(Error::Generic(
                "Component registry finalized more often than initialized".to_string(),
            ));
        }
        state.references -= 1;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().references > 0
    }

    /// Number of outstanding `init` references
    pub fn references(&self) -> usize {
        self.state.lock().references
    }

    /// Add a component. Components are matched in registration order.
    pub fn register(&self, component: Arc<dyn Component>) {
        debug!(component = component.name(), scheme = component.scheme(), "Registering component");
        self.components.write().push(component);
    }

    /// Names of the registered components, in match order
    pub fn component_names(&self) -> Vec<String> {
        self.components
            .read()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Find a component for `data_root` and let it build a module.
    ///
    /// The catalog lock is released before the component is called.
    pub fn query(&self, context: &Context, data_root: &str) -> Result<Box<dyn Module>, Error> {
        if !self.is_initialized() {
            return Err(Error::Generic(
                "Component registry is not initialized".to_string(),
            ));
        }

        let not_found = || Error::ComponentNotFound {
            data_root: data_root.to_string(),
        };
        let (scheme, _) = split_scheme(data_root).ok_or_else(not_found)?;
        let component = self
            .components
            .read()
            .iter()
            .find(|c| c.scheme() == scheme)
            .cloned()
            .ok_or_else(not_found)?;

        debug!(component = component.name(), data_root, "Querying component");
        component.query(context, data_root)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.component_names())
            .field("references", &self.references())
            .finish()
    }
}
