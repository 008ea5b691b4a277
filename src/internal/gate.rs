//! Exclusion for first-time singleton construction.

use std::collections::HashMap;
use std::pin::pin;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::{DiError, DiResult};
use crate::internal::frame::{Frame, ResolutionId};
use crate::key::Key;

/// A resolution's request to build the singleton `key`.
#[derive(Clone)]
pub(crate) struct Claim {
    key: Key,
    by: ResolutionId,
    // Keys the claiming resolution is building, ending with `key`
    path: Vec<Key>,
}

impl Claim {
    pub(crate) fn new(key: &Key, frame: &Frame) -> Self {
        Self {
            key: key.clone(),
            by: frame.id(),
            path: frame.path(),
        }
    }
}

#[derive(Default)]
struct Table {
    owners: HashMap<Key, ResolutionId>,
    waiting: HashMap<ResolutionId, Claim>,
}

impl Table {
    /// Takes the gate for `claim.key` if it is free. Otherwise records the
    /// wait, unless waiting would close a loop of resolutions each blocked
    /// on the next one.
    fn try_take(&mut self, claim: &Claim) -> DiResult<bool> {
        match self.owners.get(&claim.key).copied() {
            None => {
                self.owners.insert(claim.key.clone(), claim.by);
                self.waiting.remove(&claim.by);
                Ok(true)
            }
            Some(owner) => {
                if let Some(chain) = self.wait_cycle(claim, owner) {
                    self.waiting.remove(&claim.by);
                    return Err(DiError::Circular { chain });
                }
                self.waiting.insert(claim.by, claim.clone());
                Ok(false)
            }
        }
    }

    /// Follows gate owners and the gates they wait for. Returns the key
    /// chain when that walk leads back to the claimant.
    fn wait_cycle(&self, claim: &Claim, mut owner: ResolutionId) -> Option<Vec<Key>> {
        let mut tail = vec![claim.key.clone()];
        let mut current = claim.key.clone();
        // Each step follows a different waiter
        for _ in 0..=self.waiting.len() {
            if owner == claim.by {
                return Some(close_chain(&claim.path, &current, tail));
            }
            let waiter = self.waiting.get(&owner)?;
            match waiter.path.iter().position(|k| *k == current) {
                Some(pos) => tail.extend(waiter.path[pos + 1..].iter().cloned()),
                None => tail.extend(waiter.path.iter().cloned()),
            }
            current = waiter.key.clone();
            owner = *self.owners.get(&current)?;
        }
        None
    }
}

/// Joins the claimant's own path, from the key it already owns, with the
/// keys walked through other resolutions.
fn close_chain(path: &[Key], owned: &Key, tail: Vec<Key>) -> Vec<Key> {
    let mut chain = match path.iter().position(|k| k == owned) {
        Some(pos) if pos + 1 < path.len() => path[pos..].to_vec(),
        _ => std::iter::once(owned.clone()).chain(path.iter().cloned()).collect(),
    };
    chain.extend(tail.into_iter().skip(1));
    chain
}

/// Per-key gates for one container, usable from both blocking and async
/// callers.
///
/// Blocking waiters park on the condvar, async waiters on the `Notify`;
/// releasing any gate wakes both and every waiter re-checks its own key.
pub(crate) struct SingletonGates {
    table: Mutex<Table>,
    released: Condvar,
    notify: Notify,
}

pub(crate) struct GateGuard<'a> {
    gates: &'a SingletonGates,
    key: Key,
}

impl SingletonGates {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
            released: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub(crate) fn acquire_blocking(&self, claim: Claim) -> DiResult<GateGuard<'_>> {
        let mut table = self.table.lock();
        while !table.try_take(&claim)? {
            self.released.wait(&mut table);
        }
        Ok(self.guard(claim))
    }

    pub(crate) async fn acquire(&self, claim: Claim) -> DiResult<GateGuard<'_>> {
        let _waiting = Waiting {
            gates: self,
            by: claim.by,
        };
        loop {
            let mut notified = pin!(self.notify.notified());
            {
                let mut table = self.table.lock();
                if table.try_take(&claim)? {
                    return Ok(self.guard(claim));
                }
                // Registered before the lock is released so a concurrent
                // release cannot slip between the check and the wait.
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    fn guard(&self, claim: Claim) -> GateGuard<'_> {
        GateGuard {
            gates: self,
            key: claim.key,
        }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gates.table.lock().owners.remove(&self.key);
        self.gates.released.notify_all();
        self.gates.notify.notify_waiters();
    }
}

// Clears a cancelled async waiter's entry so it cannot show up in a later
// cycle walk.
struct Waiting<'a> {
    gates: &'a SingletonGates,
    by: ResolutionId,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.gates.table.lock().waiting.remove(&self.by);
    }
}
