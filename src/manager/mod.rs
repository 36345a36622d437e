//! Generic fetch-or-cache entity managers.
//!
//! One [`EntityManager`] exists per entity kind per owning scope (e.g. the
//! messages of one channel, the members of one server). It owns a
//! [`BoundedCache`] and implements the same read/write surface for every
//! kind:
//!
//! - [`fetch`](EntityManager::fetch) returns the cached `Arc` when present,
//!   otherwise reads from REST and caches the result;
//! - [`fetch_many`](EntityManager::fetch_many) reads one page of a list;
//! - [`create`](EntityManager::create), [`update`](EntityManager::update) and
//!   [`delete`](EntityManager::delete) issue the write and keep the cache in
//!   step.
//!
//! Which operations a kind supports is expressed with the [`Listable`],
//! [`Creatable`], [`Updatable`] and [`Deletable`] marker traits.
//!
//! REST failures propagate unchanged and leave the cache untouched.

pub mod scoped;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::BoundedCache;
use crate::config::CachePolicy;
use crate::models::EntityKind;
use crate::rest::{Method, Rest, query_pairs};
use crate::telemetry;
use crate::{HuginnError, Result};

pub use scoped::ManagerRegistry;

/// An entity kind that can be managed.
///
/// Implementors describe how to locate the entity over REST, how to build it
/// from a payload, and how it is tombstoned.
pub trait Resource: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;
    /// Owner key of the manager (e.g. a channel id for messages).
    type Scope: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// Child-manager registries needed to construct the entity.
    type Deps: Clone + Send + Sync + 'static;

    const KIND: EntityKind;
    /// Response envelope key for a single entity (e.g. `"message"`).
    const SINGULAR: &'static str;
    /// Response envelope key for a list (e.g. `"messages"`).
    const PLURAL: &'static str;

    fn id(&self) -> Self::Id;

    fn collection_path(scope: &Self::Scope) -> String;

    fn item_path(scope: &Self::Scope, id: &Self::Id) -> String {
        format!("{}/{id}", Self::collection_path(scope))
    }

    fn from_payload(scope: &Self::Scope, deps: &Self::Deps, payload: Value) -> Result<Self>;

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn mark_deleted(&mut self, at: DateTime<Utc>);
}

/// Kinds with a list endpoint.
pub trait Listable: Resource {
    type Query: Serialize + Default + Send + Sync;
}

/// Kinds that can be created over REST.
pub trait Creatable: Resource {
    type Create: Serialize + Send + Sync;

    fn create_path(scope: &Self::Scope, _payload: &Self::Create) -> String {
        Self::collection_path(scope)
    }
}

/// Kinds that can be updated over REST.
pub trait Updatable: Resource {
    type Update: Serialize + Send + Sync;

    const UPDATE_METHOD: Method = Method::Patch;
}

/// Kinds that can be deleted over REST.
pub trait Deletable: Resource {}

/// Options for [`EntityManager::fetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache and always issue a REST read.
    pub force: bool,
    /// Whether to cache the fetched entity. `None` follows the kind's policy.
    pub cache: Option<bool>,
}

impl FetchOptions {
    /// Options that bypass the cache.
    pub fn forced() -> Self {
        Self {
            force: true,
            cache: None,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Fetch-or-cache manager for one entity kind within one scope.
pub struct EntityManager<R: Resource> {
    scope: R::Scope,
    rest: Rest,
    policy: CachePolicy,
    deps: R::Deps,
    cache: RwLock<BoundedCache<R::Id, Arc<R>>>,
}

impl<R: Resource> EntityManager<R> {
    /// Create a manager with an empty cache.
    ///
    /// Fails if the policy's capacity is invalid.
    pub fn new(scope: R::Scope, rest: Rest, policy: CachePolicy, deps: R::Deps) -> Result<Self> {
        let cache = BoundedCache::new(policy.max)?;
        Ok(Self {
            scope,
            rest,
            policy,
            deps,
            cache: RwLock::new(cache),
        })
    }

    pub fn scope(&self) -> &R::Scope {
        &self.scope
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub(crate) fn deps(&self) -> &R::Deps {
        &self.deps
    }

    /// Cached entity, without touching the network.
    pub fn get(&self, id: &R::Id) -> Option<Arc<R>> {
        self.cache.read().get(id).cloned()
    }

    /// All cached entities in insertion order.
    pub fn cached(&self) -> Vec<Arc<R>> {
        self.cache.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// Change the cache capacity (not retroactive).
    pub fn set_capacity(&self, capacity: Option<usize>) -> Result<()> {
        self.cache.write().set_capacity(capacity)?;
        Ok(())
    }

    /// Insert an entity, returning the snapshot it replaced.
    pub fn insert(&self, entity: Arc<R>) -> Option<Arc<R>> {
        let id = entity.id();
        let mut cache = self.cache.write();
        let previous = cache.get(&id).cloned();
        cache.set(id, entity);
        previous
    }

    /// Evict an entity from the local cache only.
    pub fn evict(&self, id: &R::Id) -> Option<Arc<R>> {
        self.cache.write().remove(id)
    }

    /// Fetch an entity by id.
    ///
    /// Returns the cached `Arc` unless `options.force` is set. A REST read
    /// replaces any stale cache entry unless caching is disabled.
    #[instrument(skip(self, options), fields(kind = %R::KIND))]
    pub async fn fetch(&self, id: &R::Id, options: FetchOptions) -> Result<Arc<R>> {
        if !options.force
            && let Some(entity) = self.get(id)
        {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => R::KIND.as_str())
                .increment(1);
            return Ok(entity);
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => R::KIND.as_str()).increment(1);

        let body = self
            .rest
            .get(R::item_path(&self.scope, id), Vec::new())
            .await?;
        let entity = Arc::new(self.build(unwrap_single::<R>(body)?)?);
        if options.cache.unwrap_or(self.policy.cache) {
            self.insert(Arc::clone(&entity));
        }
        debug!(%id, "fetched");
        Ok(entity)
    }

    /// Build an entity from a payload without caching it.
    pub(crate) fn build(&self, payload: Value) -> Result<R> {
        R::from_payload(&self.scope, &self.deps, payload)
    }

    /// Construct from a pushed payload; cache it if the policy allows.
    ///
    /// Returns the previously cached snapshot (if any) and the new one.
    pub(crate) fn upsert(&self, payload: Value) -> Result<(Option<Arc<R>>, Arc<R>)> {
        let entity = Arc::new(self.build(payload)?);
        Ok(self.store(entity))
    }

    /// Cache a locally derived snapshot according to the policy.
    pub(crate) fn store(&self, entity: Arc<R>) -> (Option<Arc<R>>, Arc<R>) {
        let previous = if self.policy.cache {
            self.insert(Arc::clone(&entity))
        } else {
            self.get(&entity.id())
        };
        (previous, entity)
    }

    /// Apply a delete carrying a payload.
    ///
    /// A cached snapshot for `id` is the base of the tombstone and the
    /// payload only contributes its delete marker; otherwise the entity is
    /// decoded from the payload as-is. The result is stamped with a delete
    /// marker, then removed (dispose) or kept as a tombstone.
    pub(crate) fn discard(&self, id: &R::Id, payload: Value) -> Result<(Option<Arc<R>>, Arc<R>)> {
        let mut entity = match self.get(id) {
            Some(cached) => {
                let mut entity = (*cached).clone();
                let stamp = self.build(payload).ok().and_then(|built| built.deleted_at());
                if let Some(at) = stamp {
                    entity.mark_deleted(at);
                }
                entity
            }
            None => self.build(payload)?,
        };
        if entity.deleted_at().is_none() {
            entity.mark_deleted(Utc::now());
        }
        Ok(self.retire(entity))
    }

    /// Apply a delete that only carries an id. Needs a cached snapshot.
    pub(crate) fn discard_id(&self, id: &R::Id) -> Option<(Arc<R>, Arc<R>)> {
        let previous = self.get(id)?;
        let mut entity = (*previous).clone();
        if entity.deleted_at().is_none() {
            entity.mark_deleted(Utc::now());
        }
        let (_, tombstone) = self.retire(entity);
        Some((previous, tombstone))
    }

    fn retire(&self, entity: R) -> (Option<Arc<R>>, Arc<R>) {
        let id = entity.id();
        let entity = Arc::new(entity);
        let mut cache = self.cache.write();
        let previous = cache.get(&id).cloned();
        if self.policy.dispose {
            cache.remove(&id);
        } else if self.policy.cache || previous.is_some() {
            cache.set(id, Arc::clone(&entity));
        }
        (previous, entity)
    }

    /// Replace the cached snapshot with a modified copy.
    ///
    /// Used after sub-resource writes (pin, complete, nickname) whose
    /// response carries no entity. Returns `None` when nothing is cached.
    pub(crate) fn patch_cached(&self, id: &R::Id, patch: impl FnOnce(&mut R)) -> Option<Arc<R>> {
        let mut entity = (*self.get(id)?).clone();
        patch(&mut entity);
        let entity = Arc::new(entity);
        self.insert(Arc::clone(&entity));
        Some(entity)
    }

    /// Issue a write and build the returned entity, always caching it.
    async fn write_entity(&self, method: Method, path: String, body: Value) -> Result<Arc<R>> {
        let response = self.rest.send(method, path, &body).await?;
        let entity = Arc::new(self.build(unwrap_single::<R>(response)?)?);
        self.insert(Arc::clone(&entity));
        Ok(entity)
    }

    /// PUT/POST/DELETE on a sub-resource whose response is ignored.
    pub(crate) async fn touch(&self, method: Method, path: String) -> Result<()> {
        self.rest.send_empty(method, path).await
    }

    pub(crate) fn rest(&self) -> &Rest {
        &self.rest
    }
}

impl<R: Listable> EntityManager<R> {
    /// Fetch one page of entities.
    ///
    /// Each item is cached unless `cache` is `Some(false)` (default follows
    /// the policy). Cached entries missing from the page are left alone.
    #[instrument(skip(self, query), fields(kind = %R::KIND))]
    pub async fn fetch_many(
        &self,
        query: &R::Query,
        cache: Option<bool>,
    ) -> Result<BoundedCache<R::Id, Arc<R>>> {
        let body = self
            .rest
            .get(R::collection_path(&self.scope), query_pairs(query)?)
            .await?;
        let items = match body {
            Value::Object(mut map) => map.remove(R::PLURAL),
            _ => None,
        };
        let Some(Value::Array(items)) = items else {
            return Err(HuginnError::Decode(format!(
                "response missing '{}' array",
                R::PLURAL
            )));
        };

        let cache = cache.unwrap_or(self.policy.cache);
        let mut page = BoundedCache::unbounded();
        for item in items {
            let entity = Arc::new(self.build(item)?);
            if cache {
                self.insert(Arc::clone(&entity));
            }
            page.set(entity.id(), entity);
        }
        debug!(count = page.len(), "fetched page");
        Ok(page)
    }
}

impl<R: Creatable> EntityManager<R> {
    /// Create an entity. The result is always cached.
    #[instrument(skip(self, payload), fields(kind = %R::KIND))]
    pub async fn create(&self, payload: &R::Create) -> Result<Arc<R>> {
        let body = serde_json::to_value(payload)?;
        self.write_entity(Method::Post, R::create_path(&self.scope, payload), body)
            .await
    }
}

impl<R: Updatable> EntityManager<R> {
    /// Update an entity.
    ///
    /// A new snapshot is built from the response and replaces the cached
    /// `Arc`; the previous snapshot is never mutated.
    #[instrument(skip(self, payload), fields(kind = %R::KIND))]
    pub async fn update(&self, id: &R::Id, payload: &R::Update) -> Result<Arc<R>> {
        let body = serde_json::to_value(payload)?;
        self.write_entity(R::UPDATE_METHOD, R::item_path(&self.scope, id), body)
            .await
    }
}

impl<R: Deletable> EntityManager<R> {
    /// Delete an entity.
    ///
    /// With the dispose policy enabled, the cached entry is removed and
    /// returned; otherwise it is left in place and `None` is returned.
    #[instrument(skip(self), fields(kind = %R::KIND))]
    pub async fn delete(&self, id: &R::Id) -> Result<Option<Arc<R>>> {
        self.rest
            .send_empty(Method::Delete, R::item_path(&self.scope, id))
            .await?;
        if self.policy.dispose {
            Ok(self.evict(id))
        } else {
            Ok(None)
        }
    }
}

impl<R: Resource> fmt::Debug for EntityManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("kind", &R::KIND)
            .field("scope", &self.scope)
            .field("cached", &self.len())
            .finish()
    }
}

/// Extract the single-entity envelope (`{"message": {...}}`).
fn unwrap_single<R: Resource>(body: Value) -> Result<Value> {
    match body {
        Value::Object(mut map) => map.remove(R::SINGULAR).ok_or_else(|| {
            HuginnError::Decode(format!("response missing '{}' object", R::SINGULAR))
        }),
        _ => Err(HuginnError::Decode(format!(
            "expected '{}' envelope object",
            R::SINGULAR
        ))),
    }
}
