//! Module registry and requirer
//!
//! Holds the factory table and the module cache. A module's record is cached
//! before its factory runs, so a dependency cycle that comes back to a module
//! still being instantiated receives the partially-filled exports instead of
//! re-entering the factory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::ModuleError;
use crate::ids::ModuleId;
use crate::module::value::Exports;

/// Callable that populates a module's exports
pub type ModuleFactory =
    Arc<dyn Fn(&ModuleRecord, &Exports, &ModuleRegistry) -> Result<(), ModuleError> + Send + Sync>;

/// Factory table keyed by module id, as shipped inside a chunk definition
pub type FactoryMap = HashMap<ModuleId, ModuleFactory>;

/// Wrap a closure as a [`ModuleFactory`]
pub fn factory<F>(f: F) -> ModuleFactory
where
    F: Fn(&ModuleRecord, &Exports, &ModuleRegistry) -> Result<(), ModuleError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Cached instance of a module
pub struct ModuleRecord {
    id: ModuleId,
    exports: RwLock<Exports>,
    loaded: AtomicBool,
}

impl ModuleRecord {
    fn new(id: ModuleId) -> Self {
        Self {
            id,
            exports: RwLock::new(Exports::new()),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Current exports namespace
    pub fn exports(&self) -> Exports {
        self.exports
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a different exports namespace
    ///
    /// Requirers that arrive after the swap get the new namespace; anyone who
    /// already holds the original keeps it.
    pub fn replace_exports(&self, exports: Exports) {
        *self.exports.write().unwrap_or_else(|e| e.into_inner()) = exports;
    }

    /// Whether the factory returned successfully
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Factory table plus module cache
#[derive(Default)]
pub struct ModuleRegistry {
    factories: RwLock<FactoryMap>,
    cache: Mutex<HashMap<ModuleId, Arc<ModuleRecord>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge factories into the table; a later factory for an id replaces
    /// the earlier one
    pub fn install_factories(&self, factories: FactoryMap) {
        if factories.is_empty() {
            return;
        }
        let mut table = self.factories.write().unwrap_or_else(|e| e.into_inner());
        for (id, factory) in factories {
            if table.insert(id.clone(), factory).is_some() {
                debug!("Replaced factory for module {}", id);
            }
        }
    }

    pub fn has_factory(&self, id: &ModuleId) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn is_cached(&self, id: &ModuleId) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Cached record for `id`, if the module has been required
    pub fn record(&self, id: &ModuleId) -> Option<Arc<ModuleRecord>> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Instantiate (once) and return a module's exports
    ///
    /// A factory error propagates to the caller and leaves the partially
    /// filled record cached; requiring the id again returns that record
    /// without calling the factory a second time.
    pub fn require(&self, id: impl Into<ModuleId>) -> Result<Exports, ModuleError> {
        let id = id.into();
        let (record, factory) = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(record) = cache.get(&id) {
                trace!("Module {} served from cache", id);
                return Ok(record.exports());
            }

            let factory = self
                .factories
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&id)
                .cloned()
                .ok_or_else(|| ModuleError::NotFound(id.clone()))?;

            let record = Arc::new(ModuleRecord::new(id.clone()));
            cache.insert(id.clone(), Arc::clone(&record));
            (record, factory)
        };

        debug!("Instantiating module {}", id);
        let exports = record.exports();
        factory(&record, &exports, self)?;
        record.loaded.store(true, Ordering::Release);
        Ok(record.exports())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::value::Value;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: Arc<AtomicUsize>, value: i32) -> ModuleFactory {
        factory(move |_, exports, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            exports.set("value", value);
            Ok(())
        })
    }

    #[test]
    fn test_require_runs_factory_once() {
        let registry = ModuleRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut factories = FactoryMap::new();
        factories.insert(ModuleId::from(1), counting(Arc::clone(&calls), 42));
        registry.install_factories(factories);

        let first = registry.require(1).unwrap();
        let second = registry.require(1).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(first.get("value"), Value::from(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.record(&ModuleId::from(1)).unwrap().is_loaded());
    }

    #[test]
    fn test_cycle_sees_partial_exports() {
        let registry = ModuleRegistry::new();
        let mut factories = FactoryMap::new();
        factories.insert(
            ModuleId::from("a"),
            factory(|_, exports, registry| {
                exports.set("early", true);
                let b = registry.require("b")?;
                exports.set("b_saw", b.get("a_early"));
                Ok(())
            }),
        );
        factories.insert(
            ModuleId::from("b"),
            factory(|_, exports, registry| {
                let a = registry.require("a")?;
                exports.set("a_early", a.get("early"));
                Ok(())
            }),
        );
        registry.install_factories(factories);

        let a = registry.require("a").unwrap();
        assert_eq!(a.get("b_saw"), Value::Bool(true));
    }

    #[test]
    fn test_factory_error_keeps_record() {
        let registry = ModuleRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut factories = FactoryMap::new();
        factories.insert(
            ModuleId::from("broken"),
            factory(move |record, exports, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                exports.set("partial", 1);
                Err(ModuleError::factory(record.id(), "boom"))
            }),
        );
        registry.install_factories(factories);

        assert!(matches!(
            registry.require("broken"),
            Err(ModuleError::FactoryFailed { .. })
        ));
        let partial = registry.require("broken").unwrap();
        assert_eq!(partial.get("partial"), Value::from(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.record(&ModuleId::from("broken")).unwrap().is_loaded());
    }

    #[test]
    fn test_missing_factory_is_not_cached() {
        let registry = ModuleRegistry::new();
        assert!(matches!(registry.require(9), Err(ModuleError::NotFound(_))));
        assert!(!registry.is_cached(&ModuleId::from(9)));
    }

    #[test]
    fn test_replaced_exports_are_returned() {
        let registry = ModuleRegistry::new();
        let mut factories = FactoryMap::new();
        factories.insert(
            ModuleId::from("swap"),
            factory(|record, _, _| {
                let replacement = Exports::new();
                replacement.set("swapped", true);
                record.replace_exports(replacement);
                Ok(())
            }),
        );
        registry.install_factories(factories);

        let exports = registry.require("swap").unwrap();
        assert_eq!(exports.get("swapped"), Value::Bool(true));
    }

    #[test]
    fn test_later_factory_overwrites() {
        let registry = ModuleRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut first = FactoryMap::new();
        first.insert(ModuleId::from(5), counting(Arc::clone(&calls), 1));
        registry.install_factories(first);
        let mut second = FactoryMap::new();
        second.insert(ModuleId::from(5), counting(Arc::clone(&calls), 2));
        registry.install_factories(second);

        assert_eq!(registry.require(5).unwrap().get("value"), Value::from(2));
    }
}
