//! Built-in POSIX filesystem component.
//!
//! Binding a `posix:<path>` data root only records the path; directories are
//! created by the data path when a dataset is first written.

use super::{split_scheme, Component, Module};
use crate::context::Context;
use crate::error::Error;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SCHEME: &str = "posix";

#[derive(Debug, Default)]
pub struct PosixComponent;

impl PosixComponent {
    pub fn new() -> Self {
        Self
    }
}

impl Component for PosixComponent {
    fn name(&self) -> &str {
        "posix"
    }

    fn scheme(&self) -> &str {
        SCHEME
    }

    fn query(&self, context: &Context, data_root: &str) -> Result<Box<dyn Module>, Error> {
        let location = match split_scheme(data_root) {
            Some((SCHEME, location)) => location.trim(),
            _ => {
                return Err(Error::ComponentNotFound {
                    data_root: data_root.to_string(),
                })
            }
        };
        if location.is_empty() {
            return Err(Error::BadParameter(format!(
                "Data root {} does not name a directory",
                data_root
            )));
        }

        debug!(context = context.identifier(), root = location, "Created posix module");
        Ok(Box::new(PosixModule {
            data_root: data_root.to_string(),
            root: PathBuf::from(location),
        }))
    }
}

/// Module servicing one directory of a POSIX filesystem
#[derive(Debug)]
pub struct PosixModule {
    data_root: String,
    root: PathBuf,
}

impl PosixModule {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Module for PosixModule {
    fn component(&self) -> &str {
        "posix"
    }

    fn data_root(&self) -> &str {
        &self.data_root
    }

    fn fini(&mut self) -> Result<(), Error> {
        debug!(root = %self.root.display(), "Finalized posix module");
        Ok(())
    }
}
