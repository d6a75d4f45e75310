//! Single-flight registry.
//!
//! Collapses concurrent work for one key into a single shared future. Later
//! callers attach to the in-flight future instead of starting their own.
//!
//! # Design Decisions
//! - The registry only holds weak handles: when every waiter has dropped its
//!   handle the work is dropped (cancelled) with it
//! - A finished flight removes its own registration, guarded by a generation
//!   id so a newer flight for the same key is never removed by an older one

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};

/// Handle to an in-flight computation.
pub type SharedFlight<V> = Shared<BoxFuture<'static, V>>;

/// Whether a caller started the flight or joined an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    Leader,
    Follower,
}

struct Flight<V> {
    generation: u64,
    future: WeakShared<BoxFuture<'static, V>>,
}

pub struct SingleFlight<K, V> {
    flights: DashMap<K, Flight<V>>,
    next_generation: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flights: DashMap::new(),
            next_generation: AtomicU64::new(1),
        })
    }

    /// Join the flight for `key`, or start one from `start` if none is live.
    ///
    /// `start` runs while the key's registry slot is held, so it must not block.
    pub fn join_or_start<F>(self: &Arc<Self>, key: K, start: F) -> (SharedFlight<V>, FlightRole)
    where
        F: FnOnce() -> BoxFuture<'static, V>,
    {
        match self.flights.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Some(shared) = occupied.get().future.upgrade() {
                    return (shared, FlightRole::Follower);
                }
                // every waiter of the previous flight went away
                let (flight, shared) = self.launch(key, start);
                if let Some(flight) = flight {
                    occupied.insert(flight);
                } else {
                    occupied.remove();
                }
                (shared, FlightRole::Leader)
            }
            Entry::Vacant(vacant) => {
                let (flight, shared) = self.launch(key, start);
                if let Some(flight) = flight {
                    vacant.insert(flight);
                }
                (shared, FlightRole::Leader)
            }
        }
    }

    /// Number of keys with a registered flight.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    fn launch<F>(self: &Arc<Self>, key: K, start: F) -> (Option<Flight<V>>, SharedFlight<V>)
    where
        F: FnOnce() -> BoxFuture<'static, V>,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registry: Weak<Self> = Arc::downgrade(self);
        let work = start();

        let future: BoxFuture<'static, V> = Box::pin(async move {
            let value = work.await;
            if let Some(registry) = registry.upgrade() {
                registry
                    .flights
                    .remove_if(&key, |_, flight| flight.generation == generation);
            }
            value
        });

        let shared = future.shared();
        let flight = shared.downgrade().map(|future| Flight { generation, future });
        (flight, shared)
    }
}
