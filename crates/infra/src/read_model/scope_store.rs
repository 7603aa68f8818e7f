use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use shiftmatch_core::OrganizationScope;

/// Scope-isolated key/value store for disposable read models.
///
/// A key is only visible under the scope it was written with.
pub trait ScopeStore<K, V>: Send + Sync {
    fn get(&self, scope: &OrganizationScope, key: &K) -> Option<V>;
    fn upsert(&self, scope: &OrganizationScope, key: K, value: V);
    fn remove(&self, scope: &OrganizationScope, key: &K) -> Option<V>;
    fn list(&self, scope: &OrganizationScope) -> Vec<V>;
    /// Clear all read-model records for a scope (rebuild support).
    fn clear_scope(&self, scope: &OrganizationScope);
}

impl<K, V, S> ScopeStore<K, V> for Arc<S>
where
    S: ScopeStore<K, V> + ?Sized,
{
    fn get(&self, scope: &OrganizationScope, key: &K) -> Option<V> {
        (**self).get(scope, key)
    }

    fn upsert(&self, scope: &OrganizationScope, key: K, value: V) {
        (**self).upsert(scope, key, value)
    }

    fn remove(&self, scope: &OrganizationScope, key: &K) -> Option<V> {
        (**self).remove(scope, key)
    }

    fn list(&self, scope: &OrganizationScope) -> Vec<V> {
        (**self).list(scope)
    }

    fn clear_scope(&self, scope: &OrganizationScope) {
        (**self).clear_scope(scope)
    }
}

/// In-memory scope-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryScopeStore<K, V> {
    inner: RwLock<HashMap<OrganizationScope, HashMap<K, V>>>,
}

impl<K, V> InMemoryScopeStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryScopeStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ScopeStore<K, V> for InMemoryScopeStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, scope: &OrganizationScope, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(scope)?.get(key).cloned()
    }

    fn upsert(&self, scope: &OrganizationScope, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(scope.clone()).or_default().insert(key, value);
        }
    }

    fn remove(&self, scope: &OrganizationScope, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.get_mut(scope)?.remove(key)
    }

    fn list(&self, scope: &OrganizationScope) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.get(scope)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_scope(&self, scope: &OrganizationScope) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(scope);
        }
    }
}
