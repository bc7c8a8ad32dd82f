//! On-demand chunk loading
//!
//! `ensure` is the only way a chunk gets fetched. Concurrent callers for the
//! same chunk share one attempt; the attempt is confirmed by the chunk's own
//! registration and is failed here only if the load signal (or the timeout)
//! arrives while the chunk is still pending.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::assets::AssetResolver;
use crate::chunk::error::{ChunkLoadError, FailureType};
use crate::chunk::fetcher::{ChunkFetcher, CorrelationId, LoadEvent, LoadRequest, ResourceTracker};
use crate::chunk::state::{Admission, ChunkOutcome, ChunkState, ChunkStateTable};
use crate::ids::ChunkId;

/// Event kind reported when a load is requested outside a Tokio runtime
pub const NO_RUNTIME_EVENT: &str = "no-runtime";

/// Settings the loader needs from the runtime configuration
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub load_namespace: String,
    pub timeout: Duration,
    pub nonce: Option<String>,
    /// Chunks with no script of their own
    pub inline_chunks: HashSet<ChunkId>,
}

/// Issues and settles chunk loads
pub struct ChunkLoader {
    resolver: AssetResolver,
    states: Arc<ChunkStateTable>,
    tracker: Arc<ResourceTracker>,
    settings: LoaderSettings,
}

impl ChunkLoader {
    pub fn new(
        resolver: AssetResolver,
        states: Arc<ChunkStateTable>,
        fetcher: Arc<dyn ChunkFetcher>,
        settings: LoaderSettings,
    ) -> Self {
        Self {
            resolver,
            states,
            tracker: Arc::new(ResourceTracker::new(fetcher)),
            settings,
        }
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    pub fn request_for(&self, id: &ChunkId) -> LoadRequest {
        LoadRequest {
            chunk_id: id.clone(),
            path: self.resolver.resolve(id),
            correlation: CorrelationId::for_chunk(&self.settings.load_namespace, id),
            nonce: self.settings.nonce.clone(),
        }
    }

    /// Make sure a chunk is (or becomes) ready
    ///
    /// The load, if one is needed, is tracked before this returns; the returned
    /// future only observes the outcome. Outside a Tokio runtime nothing is
    /// fetched and the outcome is a `no-runtime` failure.
    pub fn ensure(&self, id: &ChunkId) -> impl Future<Output = ChunkOutcome> + Send + 'static {
        let receiver = if self.settings.inline_chunks.contains(id) {
            if !self.states.is_ready(id) {
                debug!("Chunk {} carries no script, marking ready", id);
                for waiter in self.states.mark_ready(id) {
                    let _ = waiter.send(Ok(()));
                }
            }
            None
        } else {
            match self.states.admit(id) {
                Admission::Ready => None,
                Admission::Joined(rx) => Some(rx),
                Admission::Start(rx) => {
                    self.spawn_load(self.request_for(id));
                    Some(rx)
                }
            }
        };

        let id = id.clone();
        let path = self.resolver.resolve(&id);
        async move {
            match receiver {
                None => Ok(()),
                Some(rx) => rx.await.unwrap_or_else(|_| {
                    Err(ChunkLoadError::new(
                        id,
                        FailureType::Event("aborted".to_string()),
                        path,
                    ))
                }),
            }
        }
    }

    /// Start fetching a chunk without marking it pending
    ///
    /// A later `ensure` adopts the load. Ready or pending chunks are left
    /// alone, as is everything when called outside a Tokio runtime.
    pub fn preload(&self, id: &ChunkId) {
        if self.settings.inline_chunks.contains(id) || self.states.state(id) != ChunkState::Unrequested {
            return;
        }
        debug!("Preloading chunk {}", id);
        self.tracker.hint(self.request_for(id), self.settings.timeout);
    }

    /// Register the load with the tracker, then wait for it on a task
    fn spawn_load(&self, request: LoadRequest) {
        let Ok(handle) = Handle::try_current() else {
            settle(
                &self.states,
                &request,
                LoadEvent::Error(NO_RUNTIME_EVENT.to_string()),
            );
            return;
        };
        debug!("Loading chunk {} from {}", request.chunk_id, request.path);
        let tracked = self.tracker.track(request.clone());
        let tracker = Arc::clone(&self.tracker);
        let states = Arc::clone(&self.states);
        let timeout = self.settings.timeout;
        handle.spawn(async move {
            let event = tracker.wait(tracked, timeout).await;
            settle(&states, &request, event);
        });
    }
}

/// Fail the attempt if the chunk is still pending once the load has ended
fn settle(states: &ChunkStateTable, request: &LoadRequest, event: LoadEvent) {
    let Some(waiters) = states.fail(&request.chunk_id) else {
        return;
    };
    let error = ChunkLoadError::new(
        request.chunk_id.clone(),
        event.failure_type(),
        request.path.clone(),
    );
    warn!("{}", error);
    for waiter in waiters {
        let _ = waiter.send(Err(error.clone()));
    }
}
