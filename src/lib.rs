//! ckptio: Checkpoint/Restart I/O Contexts
//!
//! A context binds one checkpoint/restart session to an ordered set of storage
//! backends ("data roots") so that applications write and read datasets without
//! depending on a particular filesystem or burst-buffer technology. Contexts can
//! be single-process or bound to a private duplicate of a process group.

pub mod component;
pub mod config;
pub mod context;
pub mod distributed;
pub mod element;
pub mod error;
pub mod logging;

pub use context::{
    create_distributed_context, create_single_process_context, destroy_context,
    query_checkpoint_hint, CheckpointHint, Context, ContextBuilder,
};
pub use element::{close_element, Element};
pub use error::{Error, ErrorKind};
