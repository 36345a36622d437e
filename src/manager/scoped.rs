//! Per-scope child managers.
//!
//! A [`ManagerRegistry`] hands out one [`EntityManager`] per owner scope
//! (e.g. one message manager per channel). Managers are created lazily the
//! first time their owner is constructed and live until the owner is
//! discarded, so rebuilding an owner's snapshot keeps the child caches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{EntityManager, Resource};
use crate::Result;
use crate::config::CachePolicy;
use crate::rest::Rest;

pub struct ManagerRegistry<R: Resource> {
    rest: Rest,
    policy: CachePolicy,
    deps: R::Deps,
    managers: Mutex<HashMap<R::Scope, Arc<EntityManager<R>>>>,
}

impl<R: Resource> ManagerRegistry<R> {
    pub fn new(rest: Rest, policy: CachePolicy, deps: R::Deps) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            rest,
            policy,
            deps,
            managers: Mutex::new(HashMap::new()),
        })
    }

    /// Manager for `scope`, creating it on first use.
    pub fn get_or_create(&self, scope: &R::Scope) -> Result<Arc<EntityManager<R>>> {
        let mut managers = self.managers.lock();
        if let Some(manager) = managers.get(scope) {
            return Ok(Arc::clone(manager));
        }
        let manager = Arc::new(EntityManager::new(
            scope.clone(),
            self.rest.clone(),
            self.policy,
            self.deps.clone(),
        )?);
        managers.insert(scope.clone(), Arc::clone(&manager));
        Ok(manager)
    }

    /// Existing manager for `scope`, if any.
    pub fn get(&self, scope: &R::Scope) -> Option<Arc<EntityManager<R>>> {
        self.managers.lock().get(scope).cloned()
    }

    /// Drop the manager for `scope` (and with it, its cache).
    pub fn remove(&self, scope: &R::Scope) -> Option<Arc<EntityManager<R>>> {
        let removed = self.managers.lock().remove(scope);
        if removed.is_some() {
            debug!(kind = %R::KIND, ?scope, "tore down scoped manager");
        }
        removed
    }

    /// Drop every manager whose scope does not satisfy `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&R::Scope) -> bool) {
        self.managers.lock().retain(|scope, _| keep(scope));
    }

    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.lock().is_empty()
    }
}

impl<R: Resource> fmt::Debug for ManagerRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("kind", &R::KIND)
            .field("scopes", &self.len())
            .finish()
    }
}
