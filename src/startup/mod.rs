//! Dependency-gated startup queue
//!
//! Deferred entries name the chunks they need, the factories they bring and
//! an optional startup callable. They wait in ascending priority order until
//! every required chunk passes the readiness checks, then run exactly once.
//!
//! A flush clears an entry's requirements only while no lower-priority entry
//! earlier in the same pass is still blocked, so a high-priority entry never
//! overtakes a blocked entry with a smaller priority value.

use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::ModuleError;
use crate::ids::{ChunkId, ModuleId};
use crate::module::{FactoryMap, ModuleFactory, Value};
use crate::runtime::ChunkRuntime;

/// Callable run once an entry's requirements are satisfied
pub type StartupFn = Box<dyn FnOnce(&ChunkRuntime) -> Result<Value, ModuleError> + Send>;

/// Named predicate every required chunk id must pass
pub type ReadinessCheck = Arc<dyn Fn(&ChunkId) -> bool + Send + Sync>;

/// A unit of deferred startup work
pub struct DeferredEntry {
    required: Vec<ChunkId>,
    factories: FactoryMap,
    startup: Option<StartupFn>,
    priority: i32,
}

impl DeferredEntry {
    pub fn new<I, C>(required: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ChunkId>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            factories: FactoryMap::new(),
            startup: None,
            priority: 0,
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

    pub fn with_startup<F>(mut self, startup: F) -> Self
    where
        F: FnOnce(&ChunkRuntime) -> Result<Value, ModuleError> + Send + 'static,
    {
        self.startup = Some(Box::new(startup));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Ids not yet cleared by a flush
    pub fn required(&self) -> &[ChunkId] {
        &self.required
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_satisfied(&self) -> bool {
        self.required.is_empty()
    }

    /// Install the entry's factories, then invoke its startup
    ///
    /// An `Undefined` startup value counts as no result.
    pub fn run(self, runtime: &ChunkRuntime) -> Result<Option<Value>, ModuleError> {
        if !self.factories.is_empty() {
            runtime.registry().install_factories(self.factories);
        }
        match self.startup {
            Some(startup) => {
                let value = startup(runtime)?;
                Ok((!value.is_undefined()).then_some(value))
            }
            None => Ok(None),
        }
    }
}

impl fmt::Debug for DeferredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredEntry")
            .field("required", &self.required)
            .field("factories", &self.factories.len())
            .field("startup", &self.startup.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Position and gating state of one flush pass
#[derive(Debug, Default)]
pub struct FlushCursor {
    index: usize,
    lowest_blocked: Option<i32>,
}

impl FlushCursor {
    /// Lowest priority among entries found blocked so far in this pass
    pub fn lowest_blocked(&self) -> Option<i32> {
        self.lowest_blocked
    }
}

/// Deferred entries in ascending priority, ties in arrival order
#[derive(Debug, Default)]
pub struct StartupQueue {
    entries: Vec<DeferredEntry>,
}

impl StartupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: DeferredEntry) {
        let mut index = self.entries.len();
        while index > 0 && self.entries[index - 1].priority > entry.priority {
            index -= 1;
        }
        debug!(
            "Deferring entry on {:?} at priority {} (position {})",
            entry.required, entry.priority, index
        );
        self.entries.insert(index, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outstanding requirements and priority of each queued entry
    pub fn pending(&self) -> Vec<(Vec<ChunkId>, i32)> {
        self.entries
            .iter()
            .map(|entry| (entry.required.clone(), entry.priority))
            .collect()
    }

    /// Every id still required by some queued entry, deduplicated
    pub fn outstanding(&self) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = self
            .entries
            .iter()
            .flat_map(|entry| entry.required.iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Continue a flush pass, removing and returning the next fulfilled entry
    ///
    /// Ids that pass `is_ready` while the gate is open are cleared from their
    /// entry for good, even if the entry as a whole stays blocked.
    pub fn take_next_ready<F>(&mut self, cursor: &mut FlushCursor, is_ready: F) -> Option<DeferredEntry>
    where
        F: Fn(&ChunkId) -> bool,
    {
        while cursor.index < self.entries.len() {
            let entry = &mut self.entries[cursor.index];
            let priority = entry.priority;
            let lowest = &mut cursor.lowest_blocked;
            let mut fulfilled = true;

            entry.required.retain(|id| {
                let gate_open = lowest.map_or(true, |blocked| blocked >= priority);
                if gate_open && is_ready(id) {
                    return false;
                }
                fulfilled = false;
                if lowest.map_or(true, |blocked| priority < blocked) {
                    *lowest = Some(priority);
                }
                true
            });

            if fulfilled {
                return Some(self.entries.remove(cursor.index));
            }
            cursor.index += 1;
        }
        None
    }
}

/// Named readiness predicates, consulted in registration order
#[derive(Default)]
pub struct ReadinessChecks {
    checks: RwLock<Vec<(String, ReadinessCheck)>>,
}

impl ReadinessChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check; a check with the same name is replaced in place
    pub fn add(&self, name: impl Into<String>, check: ReadinessCheck) {
        let name = name.into();
        let mut checks = self.checks.write().unwrap_or_else(|e| e.into_inner());
        match checks.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = check,
            None => checks.push((name, check)),
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        let mut checks = self.checks.write().unwrap_or_else(|e| e.into_inner());
        let before = checks.len();
        checks.retain(|(existing, _)| existing != name);
        checks.len() != before
    }

    pub fn names(&self) -> Vec<String> {
        self.checks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Copy of the current checks, so they can run without the lock held
    pub fn snapshot(&self) -> Vec<ReadinessCheck> {
        self.checks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, check)| Arc::clone(check))
            .collect()
    }
}
