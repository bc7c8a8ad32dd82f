//! Runtime context
//!
//! [`ChunkRuntime`] owns every piece of mutable runtime state: the module
//! registry, chunk states, the in-flight load table, the startup queue and
//! the readiness checks. It is cheap to clone and is the API handed to
//! runtime injectors and startup callables.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

use crate::assets::AssetResolver;
use crate::chunk::{ChunkFetcher, ChunkLoader, ChunkOutcome, ChunkState, ChunkStateTable};
use crate::config::RuntimeConfig;
use crate::error::{ModuleError, RuntimeError};
use crate::ids::{ChunkId, ModuleId};
use crate::intake::{ChunkDefinition, ChunkIntake, ChunkSink};
use crate::module::{Exports, ModuleRegistry, Value};
use crate::startup::{DeferredEntry, FlushCursor, ReadinessCheck, ReadinessChecks, StartupQueue};

struct RuntimeInner {
    config: RuntimeConfig,
    registry: ModuleRegistry,
    chunks: Arc<ChunkStateTable>,
    loader: ChunkLoader,
    startup: Mutex<StartupQueue>,
    checks: ReadinessChecks,
    intake: ChunkIntake,
}

/// Handle to an installed chunk runtime
#[derive(Clone)]
pub struct ChunkRuntime {
    inner: Arc<RuntimeInner>,
}

impl ChunkRuntime {
    /// Build the runtime and attach it to `intake`
    ///
    /// Definitions already buffered in the intake are processed in arrival
    /// order before this returns. Failures while draining are logged and do
    /// not abort installation.
    pub fn install(
        config: RuntimeConfig,
        fetcher: Arc<dyn ChunkFetcher>,
        intake: ChunkIntake,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let chunks = Arc::new(ChunkStateTable::with_installed(
            config.installed_chunks.iter().cloned(),
        ));
        let loader = ChunkLoader::new(
            config.asset_resolver(),
            Arc::clone(&chunks),
            fetcher,
            config.loader_settings(),
        );

        let runtime = Self {
            inner: Arc::new(RuntimeInner {
                config,
                registry: ModuleRegistry::new(),
                chunks,
                loader,
                startup: Mutex::new(StartupQueue::new()),
                checks: ReadinessChecks::new(),
                intake,
            }),
        };

        let sink: Weak<dyn ChunkSink> = Arc::downgrade(&runtime.inner) as Weak<dyn ChunkSink>;
        let report = runtime.inner.intake.attach(sink)?;
        for failure in &report.failures {
            warn!("Chunk definition from backlog was not applied: {}", failure);
        }
        info!(
            "Chunk runtime installed at {} ({} backlogged definitions, {} chunks preinstalled)",
            runtime.inner.config.base_url,
            report.processed,
            runtime.inner.config.installed_chunks.len()
        );
        Ok(runtime)
    }

    /// Detach from the intake; later definitions are buffered again
    pub fn shutdown(&self) {
        self.inner.intake.detach();
        info!("Chunk runtime detached from intake");
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    pub fn intake(&self) -> &ChunkIntake {
        &self.inner.intake
    }

    pub fn resolver(&self) -> &AssetResolver {
        self.inner.loader.resolver()
    }

    /// Instantiate (or fetch from cache) a module's exports
    pub fn require(&self, id: impl Into<ModuleId>) -> Result<Exports, ModuleError> {
        self.inner.registry.require(id)
    }

    /// Make sure a chunk is ready, fetching it if needed
    ///
    /// The load is tracked before this returns. Called outside a Tokio
    /// runtime, nothing is fetched and the outcome is a failure of type
    /// [`NO_RUNTIME_EVENT`](crate::chunk::NO_RUNTIME_EVENT).
    pub fn ensure(&self, id: impl Into<ChunkId>) -> impl Future<Output = ChunkOutcome> + Send + 'static {
        self.inner.loader.ensure(&id.into())
    }

    /// Ensure several chunks; fails with the first load error observed
    pub fn ensure_all<I, C>(&self, ids: I) -> impl Future<Output = ChunkOutcome> + Send + 'static
    where
        I: IntoIterator<Item = C>,
        C: Into<ChunkId>,
    {
        let pending: Vec<_> = ids.into_iter().map(|id| self.ensure(id)).collect();
        join_outcomes(pending)
    }

    /// Hint that a chunk will be needed; a later `ensure` adopts the load
    ///
    /// Ignored outside a Tokio runtime.
    pub fn preload(&self, id: impl Into<ChunkId>) {
        self.inner.loader.preload(&id.into());
    }

    pub fn chunk_state(&self, id: impl Into<ChunkId>) -> ChunkState {
        self.inner.chunks.state(&id.into())
    }

    pub fn ready_chunks(&self) -> Vec<ChunkId> {
        self.inner.chunks.ready_chunks()
    }

    /// Public path of a chunk's script
    pub fn chunk_path(&self, id: impl Into<ChunkId>) -> String {
        self.inner.loader.resolver().resolve(&id.into())
    }

    /// Path of a script asset given its public name or chunk id
    pub fn asset_path(&self, name_or_id: &str) -> String {
        self.inner.loader.resolver().asset_path(name_or_id)
    }

    /// Loads currently tracked by the in-flight resource table
    pub fn in_flight_loads(&self) -> usize {
        self.inner.loader.tracker().in_flight()
    }

    /// Fetches issued over the runtime's lifetime
    pub fn issued_loads(&self) -> usize {
        self.inner.loader.tracker().issued()
    }

    /// Queue startup work behind its required chunks
    ///
    /// An entry without requirements runs immediately and its startup value
    /// is returned. Otherwise the entry waits for a flush.
    pub fn defer(&self, entry: DeferredEntry) -> Result<Option<Value>, RuntimeError> {
        if entry.is_satisfied() {
            debug!("Deferred entry has no requirements, running now");
            return Ok(entry.run(self)?);
        }
        self.lock_startup().insert(entry);
        Ok(None)
    }

    /// Run every queued entry whose requirements are now satisfied
    ///
    /// Returns the last startup value produced. A startup error stops the
    /// flush; the failing entry has already left the queue.
    ///
    /// Readiness checks are evaluated with the queue unlocked, so a check may
    /// call back into the runtime.
    pub fn flush(&self) -> Result<Option<Value>, RuntimeError> {
        let checks = self.inner.checks.snapshot();
        let chunks = &self.inner.chunks;
        let is_ready = |id: &ChunkId| chunks.is_ready(id) && checks.iter().all(|check| check(id));

        let mut cursor = FlushCursor::default();
        let mut result = None;
        loop {
            let outstanding = self.lock_startup().outstanding();
            let ready: HashSet<ChunkId> = outstanding.into_iter().filter(|id| is_ready(id)).collect();
            let next = self
                .lock_startup()
                .take_next_ready(&mut cursor, |id| ready.contains(id));
            let Some(entry) = next else {
                break;
            };
            debug!("Running deferred entry at priority {}", entry.priority());
            if let Some(value) = entry.run(self)? {
                result = Some(value);
            }
        }
        Ok(result)
    }

    /// Add a named predicate every required chunk must pass
    pub fn add_readiness_check<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(&ChunkId) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Adding readiness check {}", name);
        let check: ReadinessCheck = Arc::new(check);
        self.inner.checks.add(name, check);
    }

    pub fn remove_readiness_check(&self, name: &str) -> bool {
        self.inner.checks.remove(name)
    }

    /// Entries still waiting in the startup queue
    pub fn pending_entries(&self) -> usize {
        self.lock_startup().len()
    }

    fn lock_startup(&self) -> MutexGuard<'_, StartupQueue> {
        self.inner.startup.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a chunk definition delivered through the intake
    fn register(&self, definition: ChunkDefinition) -> Result<Option<Value>, RuntimeError> {
        let ChunkDefinition {
            chunk_ids,
            factories,
            injector,
        } = definition;
        debug!(
            "Registering chunks {:?} with {} module factories",
            chunk_ids,
            factories.len()
        );

        let mut waiters = Vec::new();
        for id in &chunk_ids {
            waiters.extend(self.inner.chunks.mark_ready(id));
        }

        self.inner.registry.install_factories(factories);

        let provisional = injector
            .map(|inject| inject(self))
            .filter(|value| !value.is_undefined());

        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }

        let flushed = self.flush()?;
        Ok(flushed.or(provisional))
    }
}

fn join_outcomes<F>(pending: Vec<F>) -> impl Future<Output = ChunkOutcome> + Send + 'static
where
    F: Future<Output = ChunkOutcome> + Send + 'static,
{
    async move { try_join_all(pending).await.map(|_| ()) }
}

impl ChunkSink for RuntimeInner {
    fn accept(self: Arc<Self>, definition: ChunkDefinition) -> Result<Option<Value>, RuntimeError> {
        ChunkRuntime { inner: self }.register(definition)
    }
}
