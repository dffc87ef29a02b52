use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::domain::EngineKey;
use crate::error::{QueueError, Result};

/// Process-wide pool of engine connections keyed by `(host, port, queue name)`.
///
/// Connections are opened on first use, shared by every lease on the same key
/// and kept while the registry is up. `shutdown` drops idle connections right
/// away and the rest as their last lease is released.
pub struct ConnectionRegistry<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ConnectionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    state: Mutex<State<C>>,
}

struct State<C> {
    entries: HashMap<EngineKey, Entry<C>>,
    shut_down: bool,
}

struct Entry<C> {
    conn: C,
    leases: usize,
}

impl<C> Inner<C> {
    fn lock(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C: Clone + Send + 'static> ConnectionRegistry<C> {
    pub fn startup() -> Self {
        debug!("connection registry started");
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    shut_down: false,
                }),
            }),
        }
    }

    /// Leases the connection for `key`, dialing with `connect` if none is cached.
    pub async fn acquire<F, Fut>(&self, key: &EngineKey, connect: F) -> Result<ConnectionLease<C>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        if let Some(lease) = self.lease_cached(key)? {
            return Ok(lease);
        }

        let conn = connect().await?;

        let mut state = self.inner.lock();
        if state.shut_down {
            return Err(shut_down(key));
        }

        // Another caller may have connected meanwhile; keep the first connection.
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry { conn, leases: 0 });
        entry.leases += 1;
        debug!(engine = %key, leases = entry.leases, "opened engine connection");

        Ok(ConnectionLease {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            conn: entry.conn.clone(),
        })
    }

    fn lease_cached(&self, key: &EngineKey) -> Result<Option<ConnectionLease<C>>> {
        let mut state = self.inner.lock();
        if state.shut_down {
            return Err(shut_down(key));
        }

        Ok(state.entries.get_mut(key).map(|entry| {
            entry.leases += 1;
            ConnectionLease {
                inner: Arc::clone(&self.inner),
                key: key.clone(),
                conn: entry.conn.clone(),
            }
        }))
    }

    /// Outstanding leases on `key`.
    pub fn leases(&self, key: &EngineKey) -> usize {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|e| e.leases)
            .unwrap_or(0)
    }

    pub fn total_leases(&self) -> usize {
        self.inner.lock().entries.values().map(|e| e.leases).sum()
    }

    /// Cached connections, leased or idle.
    pub fn connections(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Stops handing out leases and drops idle connections. Returns how many were dropped.
    pub fn shutdown(&self) -> usize {
        let mut state = self.inner.lock();
        state.shut_down = true;

        let before = state.entries.len();
        state.entries.retain(|_, e| e.leases > 0);
        let dropped = before - state.entries.len();

        debug!(
            dropped,
            still_leased = state.entries.len(),
            "connection registry shut down"
        );
        dropped
    }
}

fn shut_down(key: &EngineKey) -> QueueError {
    QueueError::engine(key.to_string(), "connection registry is shut down")
}

/// A borrowed engine connection. Released exactly once, when dropped.
pub struct ConnectionLease<C> {
    inner: Arc<Inner<C>>,
    key: EngineKey,
    conn: C,
}

impl<C> ConnectionLease<C> {
    pub fn connection(&self) -> &C {
        &self.conn
    }
}

impl<C> Drop for ConnectionLease<C> {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        let shut_down = state.shut_down;

        let Some(entry) = state.entries.get_mut(&self.key) else {
            return;
        };
        entry.leases = entry.leases.saturating_sub(1);
        let leases = entry.leases;

        if leases == 0 && shut_down {
            state.entries.remove(&self.key);
        }
        debug!(engine = %self.key, leases, "released engine connection");
    }
}
