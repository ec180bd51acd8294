//! Per-partition state slots
//!
//! Each agent type (or config scope) owns one [`Slot`] with its own lock.
//! The slot table is built once and never resized, so reaching the slot for
//! one partition never touches another partition's lock.
//!
//! Remote reads draw a [`Ticket`] before the request goes out. A response is
//! applied only when no later ticket has been applied already, which keeps a
//! slow, older response from overwriting a newer one.

use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use dmas_types::{AgentType, ConfigScope};

/// Key of a fixed, closed set of partitions
pub(crate) trait Partition: Copy {
    fn partitions() -> Vec<Self>;
    fn index(self) -> usize;
}

impl Partition for AgentType {
    fn partitions() -> Vec<Self> {
        AgentType::ALL.to_vec()
    }

    fn index(self) -> usize {
        match self {
            AgentType::Pwp => 0,
            AgentType::Res => 1,
            AgentType::Dem => 2,
            AgentType::Str => 3,
            AgentType::Mrk => 4,
            AgentType::Net => 5,
        }
    }
}

impl Partition for ConfigScope {
    fn partitions() -> Vec<Self> {
        ConfigScope::all().collect()
    }

    fn index(self) -> usize {
        match self {
            ConfigScope::Service => 0,
            ConfigScope::Agent(agent_type) => 1 + agent_type.index(),
        }
    }
}

/// Sequence number drawn before a remote read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Ticket(u64);

struct Versioned<T> {
    value: T,
    applied: u64,
}

/// State of one partition
pub(crate) struct Slot<T> {
    state: RwLock<Versioned<T>>,
    issued: AtomicU64,
}

impl<T> Slot<T> {
    fn new(value: T) -> Self {
        Self {
            state: RwLock::new(Versioned { value, applied: 0 }),
            issued: AtomicU64::new(0),
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.read().value)
    }

    /// Apply a remote result; `None` when a later ticket already won
    pub fn apply<R>(&self, ticket: Ticket, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut state = self.state.write();
        if ticket.0 <= state.applied {
            return None;
        }
        state.applied = ticket.0;
        Some(f(&mut state.value))
    }

    /// Record a failed remote read; `None` when a later ticket already won
    ///
    /// Unlike [`Slot::apply`] this does not advance the slot, so an older
    /// read that succeeds afterwards is still applied.
    pub fn reject<R>(&self, ticket: Ticket, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut state = self.state.write();
        if ticket.0 <= state.applied {
            return None;
        }
        Some(f(&mut state.value))
    }

    /// Local mutation; supersedes every remote read already in flight
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let ticket = self.ticket();
        let mut state = self.state.write();
        state.applied = state.applied.max(ticket.0);
        f(&mut state.value)
    }

    /// Mutation that leaves in-flight reads eligible
    pub fn touch<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.state.write().value)
    }
}

/// One slot per partition key
pub(crate) struct Partitioned<K, T> {
    slots: Vec<Slot<T>>,
    _key: PhantomData<fn(K)>,
}

impl<K: Partition, T: Default> Partitioned<K, T> {
    pub fn new() -> Self {
        Self {
            slots: K::partitions().into_iter().map(|_| Slot::new(T::default())).collect(),
            _key: PhantomData,
        }
    }
}

impl<K: Partition, T> Partitioned<K, T> {
    pub fn slot(&self, key: K) -> &Slot<T> {
        &self.slots[key.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &Slot<T>)> + '_ {
        K::partitions().into_iter().map(move |key| (key, self.slot(key)))
    }
}
