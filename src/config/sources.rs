//! Configuration sources consulted when variables are bound.

pub mod environment;
pub mod file;
