//! Process-wide named mutexes
//!
//! Resources that mutate a shared parent (a subnet and its virtual network,
//! an association and its network interface) take the parent's lock so
//! concurrent applies do not overwrite each other's PUTs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::OwnedMutexGuard;

type LockTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

fn table() -> &'static LockTable {
    static LOCKS: OnceLock<LockTable> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn key(name: &str, kind: &str) -> String {
    format!("{}.{}", kind, name)
}

fn lock_for(key: &str) -> Arc<tokio::sync::Mutex<()>> {
    // A poisoned table still holds valid mutexes.
    let mut locks = table().lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(locks.entry(key.to_string()).or_default())
}

/// Held while the named object is being modified; dropping it unlocks.
pub struct NamedLockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl NamedLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        tracing::trace!("unlocking {}", self.key);
    }
}

/// (name, kind) pair identifying a lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockName {
    pub name: String,
    pub kind: &'static str,
}

impl LockName {
    pub fn new(name: impl Into<String>, kind: &'static str) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

pub async fn by_name(name: &str, kind: &str) -> NamedLockGuard {
    acquire(key(name, kind)).await
}

/// Locks several names of one kind. Names are sorted and deduplicated first
/// so two callers never wait on each other in opposite order.
pub async fn multiple_by_name(names: &[String], kind: &str) -> Vec<NamedLockGuard> {
    let keys: Vec<String> = names.iter().map(|n| key(n, kind)).collect();
    acquire_all(keys).await
}

/// Locks a mixed set of names in canonical order
pub async fn by_names(names: &[LockName]) -> Vec<NamedLockGuard> {
    let keys: Vec<String> = names.iter().map(|n| key(&n.name, n.kind)).collect();
    acquire_all(keys).await
}

async fn acquire_all(mut keys: Vec<String>) -> Vec<NamedLockGuard> {
    keys.sort();
    keys.dedup();
    let mut guards = Vec::with_capacity(keys.len());
    for key in keys {
        guards.push(acquire(key).await);
    }
    guards
}

async fn acquire(key: String) -> NamedLockGuard {
    tracing::trace!("locking {}", key);
    let guard = lock_for(&key).lock_owned().await;
    NamedLockGuard { key, _guard: guard }
}
