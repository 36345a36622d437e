//! Time, idle and count bounded event collectors.
//!
//! A [`Collector`] accumulates entities that pass a (possibly async) filter
//! until one of its bounds fires or it is ended by hand:
//!
//! - `time`: end this long after construction, regardless of activity;
//! - `idle`: end this long after the last collected item (or construction);
//! - `max`: end once this many items are collected.
//!
//! Bounds compose; the first to fire wins. Once ended, a collector never
//! changes again. Collectors are usually created through
//! [`Client::collector`](crate::Client::collector), which feeds them from the
//! event bus and unsubscribes when they end.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::BoundedCache;
use crate::manager::Resource;

/// Collected entities keyed by id, in collection order.
pub type Collected<R> = BoundedCache<<R as Resource>::Id, Arc<R>>;

type Filter<R> = Arc<dyn Fn(Arc<R>) -> BoxFuture<'static, bool> + Send + Sync>;

/// Bounds and behaviour of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorOptions {
    /// End this long after construction.
    pub time: Option<Duration>,
    /// End after this long without a collected item.
    pub idle: Option<Duration>,
    /// End once this many items are collected.
    pub max: Option<usize>,
    /// Remove collected items when they are deleted upstream. Default: true.
    pub dispose: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            time: None,
            idle: None,
            max: None,
            dispose: true,
        }
    }
}

impl CollectorOptions {
    pub fn time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    pub fn idle(mut self, idle: Duration) -> Self {
        self.idle = Some(idle);
        self
    }

    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn dispose(mut self, dispose: bool) -> Self {
        self.dispose = dispose;
        self
    }
}

/// Why a collector ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    Manual,
    Time,
    Idle,
    Limit,
}

/// Notifications emitted by a collector.
#[derive(Debug, Clone)]
pub enum CollectorEvent<R: Resource> {
    Collected(Arc<R>),
    Disposed(Arc<R>),
    End {
        collected: Collected<R>,
        reason: EndReason,
    },
}

struct State<R: Resource> {
    collected: Collected<R>,
    ended_at: Option<Instant>,
    reason: Option<EndReason>,
    idle_timer: Option<AbortHandle>,
    time_timer: Option<AbortHandle>,
}

struct Inner<R: Resource> {
    filter: Filter<R>,
    options: CollectorOptions,
    created_at: Instant,
    state: Mutex<State<R>>,
    events: broadcast::Sender<CollectorEvent<R>>,
    ended: watch::Sender<bool>,
}

impl<R: Resource> Inner<R> {
    /// Transition to `Ended`. Returns false if already ended.
    fn finish(&self, reason: EndReason) -> bool {
        let collected = {
            let mut state = self.state.lock();
            if state.ended_at.is_some() {
                return false;
            }
            state.ended_at = Some(Instant::now());
            state.reason = Some(reason);
            for timer in [state.idle_timer.take(), state.time_timer.take()]
                .into_iter()
                .flatten()
            {
                timer.abort();
            }
            state.collected.clone()
        };
        debug!(kind = %R::KIND, ?reason, collected = collected.len(), "collector ended");
        let _ = self.events.send(CollectorEvent::End { collected, reason });
        self.ended.send_replace(true);
        true
    }
}

/// Schedule `reason` to end the collector after `after`.
fn schedule<R: Resource>(inner: &Arc<Inner<R>>, after: Duration, reason: EndReason) -> AbortHandle {
    let weak: Weak<Inner<R>> = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(inner) = weak.upgrade() {
            inner.finish(reason);
        }
    })
    .abort_handle()
}

/// Accumulates entities of kind `R` that pass a filter.
///
/// Cheap to clone; clones share state.
pub struct Collector<R: Resource> {
    inner: Arc<Inner<R>>,
}

impl<R: Resource> Clone for Collector<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> Collector<R> {
    /// Create a collector with a synchronous filter.
    ///
    /// Must be called within a tokio runtime when `time` or `idle` is set.
    pub fn new<F>(options: CollectorOptions, filter: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        Self::with_async_filter(options, move |item: Arc<R>| {
            let keep = filter(&item);
            async move { keep }
        })
    }

    /// Create a collector whose filter is awaited for each candidate.
    pub fn with_async_filter<F, Fut>(options: CollectorOptions, filter: F) -> Self
    where
        F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let filter: Filter<R> = Arc::new(move |item| filter(item).boxed());
        let (events, _) = broadcast::channel(64);
        let (ended, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            filter,
            options,
            created_at: Instant::now(),
            state: Mutex::new(State {
                collected: BoundedCache::unbounded(),
                ended_at: None,
                reason: None,
                idle_timer: None,
                time_timer: None,
            }),
            events,
            ended,
        });

        let time_timer = options
            .time
            .map(|time| schedule(&inner, time, EndReason::Time));
        let idle_timer = options
            .idle
            .map(|idle| schedule(&inner, idle, EndReason::Idle));
        {
            let mut state = inner.state.lock();
            state.time_timer = time_timer;
            state.idle_timer = idle_timer;
        }
        Self { inner }
    }

    pub fn options(&self) -> CollectorOptions {
        self.inner.options
    }

    /// Offer a candidate item.
    ///
    /// Returns whether the item was collected.
    pub async fn collect(&self, item: Arc<R>) -> bool {
        if self.is_ended() {
            return false;
        }
        if !(self.inner.filter)(Arc::clone(&item)).await {
            return false;
        }

        let limit_reached = {
            let mut state = self.inner.state.lock();
            // The filter may have awaited past the end.
            if state.ended_at.is_some() {
                return false;
            }
            state.collected.set(item.id(), Arc::clone(&item));
            let _ = self
                .inner
                .events
                .send(CollectorEvent::Collected(Arc::clone(&item)));
            if let Some(idle) = self.inner.options.idle {
                if let Some(timer) = state.idle_timer.take() {
                    timer.abort();
                }
                state.idle_timer = Some(schedule(&self.inner, idle, EndReason::Idle));
            }
            self.inner
                .options
                .max
                .is_some_and(|max| state.collected.len() >= max)
        };

        if limit_reached {
            self.inner.finish(EndReason::Limit);
        }
        true
    }

    /// Remove a collected item that was deleted upstream.
    ///
    /// Returns the removed item. No-op once ended or when `dispose` is off.
    pub fn dispose(&self, id: &R::Id) -> Option<Arc<R>> {
        if !self.inner.options.dispose {
            return None;
        }
        let mut state = self.inner.state.lock();
        if state.ended_at.is_some() {
            return None;
        }
        let removed = state.collected.remove(id)?;
        let _ = self
            .inner
            .events
            .send(CollectorEvent::Disposed(Arc::clone(&removed)));
        Some(removed)
    }

    /// End the collector. Subsequent calls have no effect.
    pub fn end(&self) {
        self.inner.finish(EndReason::Manual);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().ended_at.is_some()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.inner.state.lock().reason
    }

    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.inner.state.lock().ended_at
    }

    /// Snapshot of the items collected so far.
    pub fn collected(&self) -> Collected<R> {
        self.inner.state.lock().collected.clone()
    }

    /// Notifications from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectorEvent<R>> {
        self.inner.events.subscribe()
    }

    /// Wait until the collector ends and return what it collected.
    pub async fn wait(&self) -> Collected<R> {
        let mut ended = self.inner.ended.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = ended.wait_for(|ended| *ended).await;
        self.collected()
    }
}

impl<R: Resource> fmt::Debug for Collector<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Collector")
            .field("kind", &R::KIND)
            .field("options", &self.inner.options)
            .field("collected", &state.collected.len())
            .field("reason", &state.reason)
            .finish()
    }
}
