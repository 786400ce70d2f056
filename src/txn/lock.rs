//! Lock Manager
//!
//! Collection-level reader/writer locks plus a database-wide exclusive lock
//! for version changes. A blocked writer holds back new readers of its
//! collections, and a blocked version change holds back everyone.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SymbolDbError};

use super::TransactionMode;

#[derive(Debug, Default)]
struct CollectionLock {
    readers: usize,
    writer: bool,

    /// Read-write transactions blocked on this collection; new readers queue behind them
    waiting_writers: usize,
}

impl CollectionLock {
    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer && self.waiting_writers == 0
    }
}

#[derive(Debug, Default)]
struct LockTable {
    collections: HashMap<String, CollectionLock>,

    /// Transactions currently holding locks
    active: usize,

    /// A version change holds the database
    exclusive: bool,

    /// Version changes waiting; new transactions queue behind them
    exclusive_waiters: usize,
}

impl LockTable {
    fn can_grant(&self, mode: TransactionMode, scope: &BTreeSet<String>) -> bool {
        if self.exclusive {
            return false;
        }

        match mode {
            TransactionMode::VersionChange => self.active == 0,
            TransactionMode::ReadOnly => {
                self.exclusive_waiters == 0
                    && scope.iter().all(|name| {
                        self.collections
                            .get(name)
                            .map(|lock| !lock.writer && lock.waiting_writers == 0)
                            .unwrap_or(true)
                    })
            }
            TransactionMode::ReadWrite => {
                self.exclusive_waiters == 0
                    && scope.iter().all(|name| {
                        self.collections
                            .get(name)
                            .map(|lock| !lock.writer && lock.readers == 0)
                            .unwrap_or(true)
                    })
            }
        }
    }

    fn grant(&mut self, mode: TransactionMode, scope: &BTreeSet<String>) {
        self.active += 1;
        match mode {
            TransactionMode::VersionChange => self.exclusive = true,
            TransactionMode::ReadOnly => {
                for name in scope {
                    self.collections.entry(name.clone()).or_default().readers += 1;
                }
            }
            TransactionMode::ReadWrite => {
                for name in scope {
                    self.collections.entry(name.clone()).or_default().writer = true;
                }
            }
        }
    }

    /// Record a blocked transaction so newcomers queue behind it
    fn enqueue(&mut self, mode: TransactionMode, scope: &BTreeSet<String>) {
        match mode {
            TransactionMode::VersionChange => self.exclusive_waiters += 1,
            TransactionMode::ReadWrite => {
                for name in scope {
                    self.collections.entry(name.clone()).or_default().waiting_writers += 1;
                }
            }
            TransactionMode::ReadOnly => {}
        }
    }

    fn dequeue(&mut self, mode: TransactionMode, scope: &BTreeSet<String>) {
        match mode {
            TransactionMode::VersionChange => self.exclusive_waiters -= 1,
            TransactionMode::ReadWrite => self.dequeue_writer(scope),
            TransactionMode::ReadOnly => {}
        }
    }

    fn dequeue_writer(&mut self, scope: &BTreeSet<String>) {
        for name in scope {
            let idle = match self.collections.get_mut(name) {
                Some(lock) => {
                    lock.waiting_writers -= 1;
                    lock.is_idle()
                }
                None => false,
            };
            if idle {
                self.collections.remove(name);
            }
        }
    }

    fn release(&mut self, mode: TransactionMode, scope: &BTreeSet<String>) {
        self.active -= 1;
        match mode {
            TransactionMode::VersionChange => self.exclusive = false,
            TransactionMode::ReadOnly | TransactionMode::ReadWrite => {
                for name in scope {
                    let idle = match self.collections.get_mut(name) {
                        Some(lock) => {
                            if mode == TransactionMode::ReadOnly {
                                lock.readers -= 1;
                            } else {
                                lock.writer = false;
                            }
                            lock.is_idle()
                        }
                        None => false,
                    };
                    if idle {
                        self.collections.remove(name);
                    }
                }
            }
        }
    }
}

/// Grants and releases transaction locks
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until every lock for `scope` can be granted at once
    ///
    /// Fails with `LockTimeout` after the configured timeout.
    pub fn acquire(&self, mode: TransactionMode, scope: BTreeSet<String>) -> Result<LockGuard<'_>> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();

        let mut queued = false;
        while !table.can_grant(mode, &scope) {
            if !queued {
                table.enqueue(mode, &scope);
                queued = true;
            }

            if self.released.wait_until(&mut table, deadline).timed_out()
                && !table.can_grant(mode, &scope)
            {
                table.dequeue(mode, &scope);
                // Transactions queued behind us may proceed now
                self.released.notify_all();
                return Err(SymbolDbError::LockTimeout(self.timeout.as_millis() as u64));
            }
        }

        if queued {
            table.dequeue(mode, &scope);
        }
        table.grant(mode, &scope);

        Ok(LockGuard {
            manager: self,
            mode,
            scope,
        })
    }

    /// Number of transactions currently holding locks
    pub fn active_count(&self) -> usize {
        self.table.lock().active
    }

    fn release(&self, mode: TransactionMode, scope: &BTreeSet<String>) {
        self.table.lock().release(mode, scope);
        self.released.notify_all();
    }
}

/// Locks held by one transaction; released on drop
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    mode: TransactionMode,
    scope: BTreeSet<String>,
}

impl LockGuard<'_> {
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn scope(&self) -> &BTreeSet<String> {
        &self.scope
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(self.mode, &self.scope);
    }
}
