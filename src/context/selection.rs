//! Active-module selection.
//!
//! Which bound module serves the next operation is decided by a
//! [`SelectionPolicy`]. The only policy provided keeps using the current module
//! and falls back to the first one when the index is unset.

use super::Context;
use crate::component::Module;
use std::fmt;
use tracing::warn;

pub trait SelectionPolicy: Send + Sync + fmt::Debug {
    /// Index of the module to use. `current` is `None` when unset;
    /// `module_count` is at least 1.
    fn select(&self, current: Option<usize>, module_count: usize) -> usize;
}

/// Keep the current module; unset selects module 0
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentModulePolicy;

impl SelectionPolicy for CurrentModulePolicy {
    fn select(&self, current: Option<usize>, _module_count: usize) -> usize {
        current.unwrap_or(0)
    }
}

impl Context {
    /// The module the next dataset operation should use.
    ///
    /// An unset selection is reset to module 0. Never fails: every active
    /// context has at least one module.
    pub fn select_module(&self) -> &dyn Module {
        let count = self.modules.len();
        let index = {
            let mut state = self.state.lock();
            let mut index = self.selection.select(state.current_module, count);
            if index >= count {
                warn!(
                    context = %self.identifier,
                    index,
                    count,
                    "Selection policy returned an out-of-range module; using module 0"
                );
                index = 0;
            }
            state.current_module = Some(index);
            index
        };
        self.modules[index].as_ref()
    }

    /// Index of the current module, `None` when unset
    pub fn current_module_index(&self) -> Option<usize> {
        self.state.lock().current_module
    }

    /// Mark the current module as unset
    pub fn reset_module_selection(&self) {
        self.state.lock().current_module = None;
    }
}
