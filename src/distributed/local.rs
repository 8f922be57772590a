//! In-process distributed runtime.
//!
//! Simulates a group of `size` ranks inside one process, one [`LocalRuntime`]
//! per rank, typically each driven from its own thread. Duplication is a real
//! collective: it blocks on a barrier shared by the whole group, and every rank
//! receives a communicator with the same fresh id.

use super::{Communicator, DistributedRuntime, RuntimeError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

/// Id of every rank's world communicator
pub const WORLD_ID: u64 = 0;

#[derive(Debug)]
struct GroupShared {
    size: u32,
    barrier: Barrier,
    // (parent id, duplicate sequence) -> id, identical on every rank
    ids: Mutex<HashMap<(u64, u64), u64>>,
    next_id: AtomicU64,
    live: AtomicUsize,
}

impl GroupShared {
    fn allocate_id(&self, parent: u64, sequence: u64) -> u64 {
        *self
            .ids
            .lock()
            .entry((parent, sequence))
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// One rank's view of an in-process runtime
#[derive(Debug)]
pub struct LocalRuntime {
    world: LocalCommunicator,
    initialized: AtomicBool,
    finalized: AtomicBool,
}

impl LocalRuntime {
    /// Create the runtimes of a `size`-rank group, indexed by rank.
    ///
    /// The runtimes start uninitialized.
    pub fn group(size: u32) -> Vec<LocalRuntime> {
        let size = size.max(1);
        let shared = Arc::new(GroupShared {
            size,
            barrier: Barrier::new(size as usize),
            ids: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(WORLD_ID + 1),
            live: AtomicUsize::new(0),
        });
        (0..size)
            .map(|rank| LocalRuntime {
                world: LocalCommunicator::new(WORLD_ID, rank, shared.clone()),
                initialized: AtomicBool::new(false),
                finalized: AtomicBool::new(false),
            })
            .collect()
    }

    /// A one-rank runtime
    pub fn single() -> LocalRuntime {
        let mut group = Self::group(1);
        group.remove(0)
    }

    pub fn init(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn finalize(&self) {
        self.finalized.store(true, Ordering::SeqCst);
    }

    /// Duplicated communicators of the whole group that have not been freed
    pub fn live_duplicates(&self) -> usize {
        self.world.group.live.load(Ordering::SeqCst)
    }
}

impl DistributedRuntime for LocalRuntime {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    fn world(&self) -> &dyn Communicator {
        &self.world
    }
}

/// Communicator of a [`LocalRuntime`] group
#[derive(Debug)]
pub struct LocalCommunicator {
    id: u64,
    rank: u32,
    group: Arc<GroupShared>,
    duplicates: AtomicU64,
}

impl LocalCommunicator {
    fn new(id: u64, rank: u32, group: Arc<GroupShared>) -> Self {
        Self {
            id,
            rank,
            group,
            duplicates: AtomicU64::new(0),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn id(&self) -> u64 {
        self.id
    }

    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.group.size
    }

    fn duplicate(&self) -> Result<Box<dyn Communicator>, RuntimeError> {
        let sequence = self.duplicates.fetch_add(1, Ordering::SeqCst);
        let id = self.group.allocate_id(self.id, sequence);
        self.group.barrier.wait();
        self.group.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LocalCommunicator::new(
            id,
            self.rank,
            self.group.clone(),
        )))
    }

    fn free(self: Box<Self>) -> Result<(), RuntimeError> {
        if self.id == WORLD_ID {
            return Err(RuntimeError::new(
                -1,
                "The world communicator cannot be freed",
            ));
        }
        self.group.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
