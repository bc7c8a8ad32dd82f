//! Chunk fetch capability and in-flight resource tracking
//!
//! The runtime never performs I/O itself. A [`ChunkFetcher`] acquires a chunk's
//! script and reports how the attempt ended; success is only confirmed when the
//! script registers its chunk through the intake. The [`ResourceTracker`]
//! sits in front of the fetcher, keyed by request path and correlation id, so a
//! load already issued out-of-band (a preload hint) is adopted instead of
//! being issued twice.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::chunk::error::FailureType;
use crate::ids::ChunkId;
use crate::utils::with_custom_timeout;

/// Tag identifying every load issued for a given chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// `<namespace>chunk-<id>`
    pub fn for_chunk(namespace: &str, id: &ChunkId) -> Self {
        Self(format!("{}chunk-{}", namespace, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single request handed to the fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub chunk_id: ChunkId,
    pub path: String,
    pub correlation: CorrelationId,
    /// Script nonce for content-security-policy hosts
    pub nonce: Option<String>,
}

/// How a load attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// The script finished executing
    Load,
    /// The fetcher reported an error event of the given kind
    Error(String),
    /// No signal arrived in time
    Timeout,
}

impl LoadEvent {
    /// Failure type to report if the chunk never registered itself
    pub fn failure_type(&self) -> FailureType {
        match self {
            LoadEvent::Load => FailureType::Missing,
            LoadEvent::Error(kind) => FailureType::Event(kind.clone()),
            LoadEvent::Timeout => FailureType::Timeout,
        }
    }
}

/// Capability that acquires and executes chunk scripts
///
/// A successful implementation delivers the chunk's definition through the
/// runtime's [`ChunkIntake`](crate::intake::ChunkIntake) before returning
/// [`LoadEvent::Load`].
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    async fn load(&self, request: LoadRequest) -> LoadEvent;
}

type SharedLoad = Shared<BoxFuture<'static, LoadEvent>>;

struct InFlight {
    correlation: CorrelationId,
    generation: usize,
    load: SharedLoad,
}

impl InFlight {
    /// Whether the load has not produced its event yet
    fn is_live(&self) -> bool {
        self.load.peek().is_none()
    }
}

/// Handle to a load registered with a [`ResourceTracker`]
#[derive(Clone)]
pub struct TrackedLoad {
    path: String,
    generation: usize,
    load: SharedLoad,
    adopted: bool,
}

impl TrackedLoad {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether an already-issued load was reused
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }
}

/// In-flight loads keyed by path, shared between requesters
pub struct ResourceTracker {
    fetcher: Arc<dyn ChunkFetcher>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    issued: AtomicUsize,
}

impl ResourceTracker {
    pub fn new(fetcher: Arc<dyn ChunkFetcher>) -> Self {
        Self {
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
            issued: AtomicUsize::new(0),
        }
    }

    /// Number of loads handed to the fetcher so far
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Acquire)
    }

    /// Number of loads currently tracked
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }

    /// Issue a load without waiting for it
    ///
    /// The load runs on its own task and leaves the table when it ends or
    /// times out; until then a later [`load`](Self::load) for the same path
    /// or correlation id adopts it. Returns `false`, issuing nothing, when
    /// called outside a Tokio runtime.
    pub fn hint(self: &Arc<Self>, request: LoadRequest, timeout: Duration) -> bool {
        let Ok(handle) = Handle::try_current() else {
            debug!("No async runtime, dropping load hint for {}", request.path);
            return false;
        };
        let tracked = self.track(request);
        if !tracked.is_adopted() {
            let tracker = Arc::clone(self);
            handle.spawn(async move {
                tracker.wait(tracked, timeout).await;
            });
        }
        true
    }

    /// Wait for a load of `request`, reusing any tracked load
    pub async fn load(&self, request: LoadRequest, timeout: Duration) -> LoadEvent {
        let tracked = self.track(request);
        self.wait(tracked, timeout).await
    }

    /// Register a load, adopting a live one for the same path or correlation
    /// id, or issuing a new one
    ///
    /// The entry is in the table when this returns; the fetcher itself only
    /// runs once the returned load is polled.
    pub fn track(&self, request: LoadRequest) -> TrackedLoad {
        let mut in_flight = self.lock();
        let existing = in_flight
            .get(&request.path)
            .filter(|entry| entry.is_live())
            .or_else(|| {
                in_flight
                    .values()
                    .find(|entry| entry.is_live() && entry.correlation == request.correlation)
            });
        if let Some(entry) = existing {
            trace!("Adopting in-flight load for {}", request.correlation);
            return TrackedLoad {
                path: request.path,
                generation: entry.generation,
                load: entry.load.clone(),
                adopted: true,
            };
        }

        let generation = self.issued.fetch_add(1, Ordering::AcqRel);
        let fetcher = Arc::clone(&self.fetcher);
        let path = request.path.clone();
        let correlation = request.correlation.clone();
        let load = async move { fetcher.load(request).await }.boxed().shared();
        in_flight.insert(
            path.clone(),
            InFlight {
                correlation,
                generation,
                load: load.clone(),
            },
        );
        TrackedLoad {
            path,
            generation,
            load,
            adopted: false,
        }
    }

    /// Wait for a tracked load to signal
    ///
    /// The load's entry is detached when the wait ends, whether by a signal
    /// or by the timeout.
    pub async fn wait(&self, tracked: TrackedLoad, timeout: Duration) -> LoadEvent {
        let TrackedLoad {
            path,
            generation,
            load,
            ..
        } = tracked;
        let event = match with_custom_timeout(load, timeout).await {
            Ok(event) => event,
            Err(_) => {
                debug!("Load of {} timed out after {:?}", path, timeout);
                LoadEvent::Timeout
            }
        };
        self.detach(generation);
        event
    }

    /// Remove the entry issued as `generation`, if it is still tracked
    fn detach(&self, generation: usize) {
        self.lock().retain(|_, entry| entry.generation != generation);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingFetcher {
        calls: AtomicUsize,
        event: LoadEvent,
    }

    #[async_trait]
    impl ChunkFetcher for CountingFetcher {
        async fn load(&self, _request: LoadRequest) -> LoadEvent {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.event.clone()
        }
    }

    fn request(id: u32) -> LoadRequest {
        let chunk_id = ChunkId::from(id);
        LoadRequest {
            path: format!("/assets/js/{}.js", chunk_id),
            correlation: CorrelationId::for_chunk("docs:", &chunk_id),
            chunk_id,
            nonce: None,
        }
    }

    #[test]
    fn test_correlation_format() {
        assert_eq!(
            CorrelationId::for_chunk("docs:", &ChunkId::from(401)).as_str(),
            "docs:chunk-401"
        );
    }

    #[test]
    fn test_event_failure_types() {
        assert_eq!(LoadEvent::Load.failure_type(), FailureType::Missing);
        assert_eq!(LoadEvent::Timeout.failure_type(), FailureType::Timeout);
        assert_eq!(
            LoadEvent::Error("error".into()).failure_type(),
            FailureType::Event("error".into())
        );
    }

    fn counting(event: LoadEvent) -> Arc<CountingFetcher> {
        Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            event,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_is_adopted() {
        let fetcher = counting(LoadEvent::Load);
        let tracker = Arc::new(ResourceTracker::new(fetcher.clone()));

        assert!(tracker.hint(request(7), Duration::from_secs(120)));
        assert!(tracker.is_tracked("/assets/js/7.js"));
        let event = tracker.load(request(7), Duration::from_secs(120)).await;

        assert_eq!(event, LoadEvent::Load);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.issued(), 1);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_hint_leaves_table() {
        let fetcher = counting(LoadEvent::Error("error".into()));
        let tracker = Arc::new(ResourceTracker::new(fetcher.clone()));

        for id in 0..50 {
            tracker.hint(request(id), Duration::from_secs(120));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.in_flight(), 0);

        // A later load issues a fresh request instead of replaying the old event.
        tracker.load(request(3), Duration::from_secs(120)).await;
        assert_eq!(tracker.issued(), 51);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 51);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_entry_is_not_adopted() {
        let fetcher = counting(LoadEvent::Load);
        let tracker = ResourceTracker::new(fetcher.clone());

        let first = tracker.track(request(12));
        assert_eq!(first.load.clone().await, LoadEvent::Load);
        assert!(tracker.is_tracked("/assets/js/12.js"));

        let second = tracker.track(request(12));
        assert!(!second.is_adopted());
        assert_eq!(tracker.issued(), 2);

        // Detaching the stale generation leaves the fresh entry alone.
        tracker.wait(first, Duration::from_secs(1)).await;
        assert!(tracker.is_tracked("/assets/js/12.js"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adopts_by_correlation_when_path_differs() {
        let fetcher = counting(LoadEvent::Load);
        let tracker = ResourceTracker::new(fetcher.clone());

        let original = tracker.track(request(13));
        let mut relocated = request(13);
        relocated.path = "https://cdn.example.com/assets/js/13.js".to_string();
        let adopted = tracker.track(relocated);

        assert!(adopted.is_adopted());
        assert_eq!(adopted.path(), "https://cdn.example.com/assets/js/13.js");
        assert_eq!(tracker.wait(adopted, Duration::from_secs(1)).await, LoadEvent::Load);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.in_flight(), 0);
        drop(original);
    }

    #[test]
    fn test_hint_outside_runtime_issues_nothing() {
        let tracker = Arc::new(ResourceTracker::new(counting(LoadEvent::Load)));
        assert!(!tracker.hint(request(1), Duration::from_secs(1)));
        assert_eq!(tracker.issued(), 0);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches() {
        let tracker = ResourceTracker::new(counting(LoadEvent::Load));

        let event = tracker.load(request(9), Duration::from_millis(1)).await;
        assert_eq!(event, LoadEvent::Timeout);
        assert!(!tracker.is_tracked("/assets/js/9.js"));
    }
}
