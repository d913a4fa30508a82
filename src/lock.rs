//! Coordination of concurrent channel operations.
//!
//! [ChannelLocks] serializes mutating operations per partner and deposits
//! globally, [PendingOpens] makes concurrent opens towards the same partner
//! share one transaction.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::{ArcMutexGuard, Condvar, Mutex, MutexGuard, RawMutex};
use tracing::debug;

use crate::{
    channel::TransactionHash,
    error::{ProxyError, Result},
    packed::types::Address,
};

/// Held while operating on the channel with one partner.
pub type PartnerGuard = ArcMutexGuard<RawMutex, ()>;

/// Per-partner locks plus the process-wide deposit lock.
///
/// When both are needed the partner lock is taken first.
#[derive(Debug, Default)]
pub struct ChannelLocks {
    partners: DashMap<Address, Arc<Mutex<()>>>,
    deposit: Mutex<()>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `partner` is ours. Locks are created on
    /// first use and never removed.
    pub fn acquire(&self, partner: Address) -> PartnerGuard {
        // Clone the Arc out so the map shard is not held while blocking.
        let lock = self.partners.entry(partner).or_default().clone();
        match lock.try_lock_arc() {
            Some(guard) => guard,
            None => {
                debug!(%partner, "Waiting for channel lock");
                lock.lock_arc()
            }
        }
    }

    pub fn acquire_deposit(&self) -> MutexGuard<'_, ()> {
        match self.deposit.try_lock() {
            Some(guard) => guard,
            None => {
                debug!("Waiting for deposit lock");
                self.deposit.lock()
            }
        }
    }
}

#[derive(Debug, Default)]
struct PendingOpen {
    outcome: Mutex<Option<Result<TransactionHash>>>,
    done: Condvar,
    waiters: AtomicUsize,
}

/// Open requests in flight, keyed by partner.
#[derive(Debug, Default)]
pub struct PendingOpens {
    pending: DashMap<Address, Arc<PendingOpen>>,
}

/// Role of a caller in a (possibly shared) open.
#[derive(Debug)]
pub enum OpenTicket<'a> {
    /// First caller for this partner. It performs the open.
    Leader(OpenLeader<'a>),
    /// Another open to the same partner is running. Wait for its outcome.
    Follower(OpenFollower),
}

#[derive(Debug)]
pub struct OpenLeader<'a> {
    opens: &'a PendingOpens,
    partner: Address,
    pending: Arc<PendingOpen>,
}

#[derive(Debug)]
pub struct OpenFollower {
    pending: Arc<PendingOpen>,
}

impl PendingOpens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, partner: Address) -> OpenTicket<'_> {
        match self.pending.entry(partner) {
            Entry::Occupied(entry) => {
                let pending = entry.get().clone();
                pending.waiters.fetch_add(1, Ordering::SeqCst);
                OpenTicket::Follower(OpenFollower { pending })
            }
            Entry::Vacant(entry) => {
                let pending = Arc::new(PendingOpen::default());
                entry.insert(pending.clone());
                OpenTicket::Leader(OpenLeader {
                    opens: self,
                    partner,
                    pending,
                })
            }
        }
    }

    /// Number of followers currently attached to the open with `partner`.
    #[cfg(test)]
    pub(crate) fn waiters(&self, partner: Address) -> usize {
        self.pending
            .get(&partner)
            .map(|pending| pending.waiters.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl OpenLeader<'_> {
    /// Hand `outcome` to all followers and return it. Followers are woken
    /// and the entry removed when `self` drops.
    pub fn publish(self, outcome: Result<TransactionHash>) -> Result<TransactionHash> {
        *self.pending.outcome.lock() = Some(outcome.clone());
        outcome
    }
}

impl Drop for OpenLeader<'_> {
    fn drop(&mut self) {
        let mut outcome = self.pending.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(Err(ProxyError::ChannelCreationFailed(self.partner)));
        }
        self.pending.done.notify_all();
        drop(outcome);

        let pending = &self.pending;
        self.opens
            .pending
            .remove_if(&self.partner, |_, entry| Arc::ptr_eq(entry, pending));
    }
}

impl OpenFollower {
    /// Block until the leader published its outcome.
    pub fn wait(self) -> Result<TransactionHash> {
        let mut outcome = self.pending.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                self.pending.waiters.fetch_sub(1, Ordering::SeqCst);
                return result.clone();
            }
            self.pending.done.wait(&mut outcome);
        }
    }
}
