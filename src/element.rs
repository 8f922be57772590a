//! Element handles.
//!
//! An [`Element`] is a file-like handle inside a dataset. Opening, reading and
//! writing belong to the backend that produced it; this module only defines how
//! a handle is closed: [`close_element`] always empties the caller's slot, so a
//! closed element cannot be closed or used again.

use crate::error::{push_error, Error};
use std::fmt;
use tracing::debug;

/// Backend side of an element
pub trait ElementBackend: Send {
    /// Flush or commit pending state and release the element's resources
    fn close(&mut self) -> Result<(), Error>;
}

pub struct Element {
    name: String,
    backend: Box<dyn ElementBackend>,
}

impl Element {
    pub fn new(name: impl Into<String>, backend: Box<dyn ElementBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn close_internal(mut self) -> Result<(), Error> {
        debug!(element = %self.name, "Closing element");
        let result = self.backend.close();
        if let Err(e) = &result {
            push_error(
                None,
                e.kind(),
                None,
                None,
                format!("Error closing element {}: {}", self.name, e),
            );
        }
        result
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element").field("name", &self.name).finish()
    }
}

/// Close the element held in `element`.
///
/// A missing slot or an empty slot is [`Error::BadParameter`] and nothing else
/// happens. Otherwise the slot is emptied before the backend runs, and the
/// backend's status is returned: a failed flush is reported even though the
/// handle is already gone.
pub fn close_element(element: Option<&mut Option<Element>>) -> Result<(), Error> {
    let Some(slot) = element else {
        return Err(Error::BadParameter(
            "Element handle pointer is null".to_string(),
        ));
    };
    let Some(element) = slot.take() else {
        return Err(Error::BadParameter(
            "Element handle is already closed".to_string(),
        ));
    };
    element.close_internal()
}
