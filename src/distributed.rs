//! Distributed identity coordination.
//!
//! A distributed context never uses the caller's process-group handle directly:
//! it duplicates it into a private [`Communicator`] (a collective, blocking call)
//! and derives its rank and size from the duplicate. The duplicate is released
//! only when the context is torn down.

use crate::error::Error;
use std::fmt;
use thiserror::Error;

pub mod local;

pub use local::{LocalCommunicator, LocalRuntime};

/// Failure reported by a distributed runtime, with its native status code
#[derive(Debug, Clone, Error)]
#[error("{message} (status {code})")]
pub struct RuntimeError {
    pub code: i32,
    pub message: String,
}

impl RuntimeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A handle on a group of cooperating processes
pub trait Communicator: Send + Sync + fmt::Debug {
    /// Runtime-assigned identifier; duplicates get a fresh one
    fn id(&self) -> u64;

    fn rank(&self) -> u32;

    fn size(&self) -> u32;

    /// Collective: every member of the group must call it. Blocks until they do.
    fn duplicate(&self) -> Result<Box<dyn Communicator>, RuntimeError>;

    /// Release a handle obtained from [`duplicate`](Self::duplicate)
    fn free(self: Box<Self>) -> Result<(), RuntimeError>;
}

/// The per-process view of a distributed runtime
pub trait DistributedRuntime: Send + Sync {
    fn is_initialized(&self) -> bool;

    fn is_finalized(&self) -> bool;

    /// The group of all processes
    fn world(&self) -> &dyn Communicator;
}

/// Rank and size of this process within its context's group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub rank: u32,
    pub size: u32,
}

impl ProcessIdentity {
    /// Identity of a single-process context
    pub const SINGLE: ProcessIdentity = ProcessIdentity { rank: 0, size: 1 };
}

impl Default for ProcessIdentity {
    fn default() -> Self {
        Self::SINGLE
    }
}

/// Verify the runtime can be used to build a context.
pub fn check_runtime(runtime: &dyn DistributedRuntime) -> Result<(), Error> {
    if !runtime.is_initialized() {
        return Err(Error::Generic(
            "Attempted to create a distributed context before the runtime was initialized"
                .to_string(),
        ));
    }
    if runtime.is_finalized() {
        return Err(Error::Generic(
            "Attempted to create a distributed context after the runtime was finalized"
                .to_string(),
        ));
    }
    Ok(())
}

/// A context's private duplicate of a process-group handle
#[derive(Debug)]
pub struct PrivateGroup {
    comm: Box<dyn Communicator>,
    identity: ProcessIdentity,
}

impl PrivateGroup {
    /// Duplicate `source` and derive this process's identity from the duplicate.
    pub fn duplicate(source: &dyn Communicator) -> Result<Self, RuntimeError> {
        let comm = source.duplicate()?;
        let identity = ProcessIdentity {
            rank: comm.rank(),
            size: comm.size(),
        };
        Ok(Self { comm, identity })
    }

    pub fn identity(&self) -> ProcessIdentity {
        self.identity
    }

    pub fn communicator(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn release(self) -> Result<(), RuntimeError> {
        self.comm.free()
    }
}
