//! Context teardown.
//!
//! Teardown is a fixed sequence of steps. A failing step is logged and pushed
//! to the error channel as soon as it happens, recorded in the
//! [`TeardownReport`], and the sequence continues.

use super::{Context, Lifecycle};
use crate::error::{push_error, Error, ErrorKind};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Modules,
    DistributedHandle,
    ComponentRegistry,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownStep::Modules => f.write_str("modules"),
            TeardownStep::DistributedHandle => f.write_str("distributed handle"),
            TeardownStep::ComponentRegistry => f.write_str("component registry"),
        }
    }
}

#[derive(Debug)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub error: Error,
}

/// Failures collected while tearing a context down, in the order they happened
#[derive(Debug, Default)]
pub struct TeardownReport {
    failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    fn record(&mut self, step: TeardownStep, error: Error) {
        self.failures.push(TeardownFailure { step, error });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[TeardownFailure] {
        &self.failures
    }

    /// The first failure, if any
    pub fn into_result(self) -> Result<(), Error> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}

impl Context {
    /// Release everything the context holds. Idempotent.
    pub(super) fn release(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.lifecycle == Lifecycle::Destroyed {
            return report;
        }
        if self.lifecycle == Lifecycle::Active && self.print_statistics() {
            println!("{}", self.statistics_summary());
        }
        self.lifecycle = Lifecycle::Destroyed;

        self.state.lock().current_module = None;

        for (index, mut module) in std::mem::take(&mut self.modules).into_iter().enumerate() {
            if let Err(e) = module.fini() {
                push_error(
                    Some(self),
                    e.kind(),
                    Some(module.data_root()),
                    None,
                    format!("Error finalizing module {}: {}", index, e),
                );
                report.record(TeardownStep::Modules, e);
            }
        }

        let entries = std::mem::take(&mut self.file_configuration);
        debug!(
            context = %self.identifier,
            entries = entries.len(),
            "Released file configuration"
        );
        drop(entries);

        if let Some(group) = self.group.take() {
            if let Err(e) = group.release() {
                push_error(
                    Some(self),
                    ErrorKind::OutOfResource,
                    None,
                    Some(e.code),
                    format!("Error freeing process group handle: {}", e.message),
                );
                report.record(
                    TeardownStep::DistributedHandle,
                    Error::OutOfResource(format!("Could not free process group handle: {}", e)),
                );
            }
        }

        self.state.lock().config.fini();

        if let Some(registry) = self.registry.take() {
            if let Err(e) = registry.fini() {
                push_error(Some(self), e.kind(), None, None, e.to_string());
                report.record(TeardownStep::ComponentRegistry, e);
            }
        }

        debug!(
            context = %self.identifier,
            failures = report.failures.len(),
            "Context released"
        );
        report
    }
}
