//! Chunk registration intake
//!
//! Fetched chunks announce themselves by pushing a [`ChunkDefinition`] into a
//! shared [`ChunkIntake`]. The intake exists independently of any runtime:
//! definitions pushed before a runtime is attached are buffered, and
//! attaching drains that backlog in arrival order before new pushes are
//! handed straight to the runtime.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::ids::{ChunkId, ModuleId};
use crate::module::{FactoryMap, ModuleFactory, Value};
use crate::runtime::ChunkRuntime;

/// Chunk-supplied callable run once on registration with the runtime API
pub type RuntimeInjector = Arc<dyn Fn(&ChunkRuntime) -> Value + Send + Sync>;

/// Everything a fetched chunk delivers when it executes
#[derive(Clone, Default)]
pub struct ChunkDefinition {
    pub chunk_ids: Vec<ChunkId>,
    pub factories: FactoryMap,
    pub injector: Option<RuntimeInjector>,
}

impl ChunkDefinition {
    pub fn new<I, C>(chunk_ids: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChunkId>,
    {
        Self {
            chunk_ids: chunk_ids.into_iter().map(Into::into).collect(),
            factories: FactoryMap::new(),
            injector: None,
        }
    }

    pub fn with_factory(mut self, id: impl Into<ModuleId>, factory: ModuleFactory) -> Self {
        self.factories.insert(id.into(), factory);
        self
    }

    pub fn with_factories(mut self, factories: FactoryMap) -> Self {
        self.factories.extend(factories);
        self
    }

    pub fn with_injector<F>(mut self, injector: F) -> Self
    where
        F: Fn(&ChunkRuntime) -> Value + Send + Sync + 'static,
    {
        self.injector = Some(Arc::new(injector));
        self
    }
}

impl fmt::Debug for ChunkDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<&ModuleId> = self.factories.keys().collect();
        modules.sort();
        f.debug_struct("ChunkDefinition")
            .field("chunk_ids", &self.chunk_ids)
            .field("modules", &modules)
            .field("injector", &self.injector.is_some())
            .finish()
    }
}

/// Receiver of definitions once a runtime is attached
pub trait ChunkSink: Send + Sync {
    fn accept(self: Arc<Self>, definition: ChunkDefinition) -> Result<Option<Value>, RuntimeError>;
}

/// Summary of the backlog processed when a sink attaches
#[derive(Debug, Default)]
pub struct DrainReport {
    pub processed: usize,
    /// Last startup value produced while draining
    pub last_value: Option<Value>,
    pub failures: Vec<RuntimeError>,
}

#[derive(Default)]
struct IntakeState {
    backlog: VecDeque<ChunkDefinition>,
    sink: Option<Weak<dyn ChunkSink>>,
    draining: bool,
    received: usize,
}

impl IntakeState {
    fn live_sink(&self) -> Option<Arc<dyn ChunkSink>> {
        self.sink.as_ref().and_then(Weak::upgrade)
    }
}

/// Shared append-only intake for chunk definitions
#[derive(Clone, Default)]
pub struct ChunkIntake {
    state: Arc<Mutex<IntakeState>>,
}

impl ChunkIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a definition
    ///
    /// With a live runtime attached the definition is processed before this
    /// returns, and the value of any startup it triggered is returned.
    /// Otherwise it is buffered and `Ok(None)` is returned.
    pub fn push(&self, definition: ChunkDefinition) -> Result<Option<Value>, RuntimeError> {
        let sink = {
            let mut state = self.lock();
            state.received += 1;
            let live = if state.draining {
                None
            } else {
                state.live_sink()
            };
            match live {
                Some(sink) => sink,
                None => {
                    debug!("Buffering definition for chunks {:?}", definition.chunk_ids);
                    state.backlog.push_back(definition);
                    return Ok(None);
                }
            }
        };
        sink.accept(definition)
    }

    /// Attach a sink and drain the backlog into it
    pub fn attach(&self, sink: Weak<dyn ChunkSink>) -> Result<DrainReport, RuntimeError> {
        {
            let mut state = self.lock();
            if state.live_sink().is_some() {
                return Err(RuntimeError::IntakeAlreadyInstalled);
            }
            state.sink = Some(sink);
            state.draining = true;
        }

        let mut report = DrainReport::default();
        loop {
            let (definition, sink) = {
                let mut state = self.lock();
                let Some(definition) = state.backlog.pop_front() else {
                    state.draining = false;
                    break;
                };
                match state.live_sink() {
                    Some(sink) => (definition, sink),
                    None => {
                        state.backlog.push_front(definition);
                        state.draining = false;
                        break;
                    }
                }
            };

            report.processed += 1;
            match sink.accept(definition) {
                Ok(Some(value)) => report.last_value = Some(value),
                Ok(None) => {}
                Err(e) => {
                    warn!("Backlogged chunk definition failed: {}", e);
                    report.failures.push(e);
                }
            }
        }
        Ok(report)
    }

    /// Detach the current sink; later pushes are buffered again
    pub fn detach(&self) {
        self.lock().sink = None;
    }

    pub fn is_attached(&self) -> bool {
        self.lock().live_sink().is_some()
    }

    /// Definitions waiting for a sink
    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    /// Definitions pushed over the intake's lifetime
    pub fn received(&self) -> usize {
        self.lock().received
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IntakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
