//! Namespace interop helpers
//!
//! Bridges between ES-style namespaces (carrying the ES-module marker and a
//! `default` binding) and plain export containers.

use bitflags::bitflags;
use std::sync::Arc;

use crate::error::ModuleError;
use crate::ids::ModuleId;
use crate::module::registry::ModuleRegistry;
use crate::module::value::{Accessor, Exports, Value, DEFAULT_EXPORT};

bitflags! {
    /// How [`create_fake_namespace`] treats its input value
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NamespaceMode: u8 {
        /// The value is a module id; require it first
        const REQUIRE               = 1 << 0;
        /// Forward every binding of a namespace value as a live accessor
        const COPY_PROPERTIES       = 1 << 1;
        /// Return ES namespaces unchanged
        const ES_MODULE_PASSTHROUGH = 1 << 2;
        /// Return the value untouched
        const AS_IS                 = 1 << 3;
    }
}

/// Mark a namespace as an ES module
pub fn mark_es_module(exports: &Exports) {
    exports.mark_es_module();
}

pub fn has_own(exports: &Exports, name: &str) -> bool {
    exports.has_own(name)
}

/// Accessor for a module's default export
///
/// ES namespaces yield their `default` binding (read on every call); anything
/// else yields the whole namespace.
pub fn compat_default(exports: &Exports) -> Accessor {
    let exports = exports.clone();
    if exports.is_es_module() {
        Arc::new(move || exports.get(DEFAULT_EXPORT))
    } else {
        Arc::new(move || Value::Namespace(exports.clone()))
    }
}

/// Install forwarded bindings as accessors
///
/// Names the target already owns are left alone.
pub fn define_exports<I, S>(target: &Exports, accessors: I)
where
    I: IntoIterator<Item = (S, Accessor)>,
    S: Into<String>,
{
    for (name, accessor) in accessors {
        target.define_accessor(name, accessor);
    }
}

/// Accessor reading `name` from `source` on every call
pub fn reexport(source: &Exports, name: impl Into<String>) -> Accessor {
    let source = source.clone();
    let name = name.into();
    Arc::new(move || source.get(&name))
}

/// Build a synthetic namespace around a value that is not an ES module
pub fn create_fake_namespace(
    registry: &ModuleRegistry,
    value: Value,
    mode: NamespaceMode,
) -> Result<Value, ModuleError> {
    let value = if mode.contains(NamespaceMode::REQUIRE) {
        let id = module_id_of(&value)
            .ok_or_else(|| ModuleError::InvalidModuleId(format!("{:?}", value)))?;
        Value::Namespace(registry.require(id)?)
    } else {
        value
    };

    if mode.contains(NamespaceMode::AS_IS) {
        return Ok(value);
    }

    if let Value::Namespace(exports) = &value {
        if mode.contains(NamespaceMode::ES_MODULE_PASSTHROUGH) && exports.is_es_module() {
            return Ok(value);
        }
    }

    let namespace = Exports::new();
    namespace.mark_es_module();

    let mut forwarded: Vec<(String, Accessor)> = Vec::new();
    if mode.contains(NamespaceMode::COPY_PROPERTIES) {
        if let Value::Namespace(source) = &value {
            forwarded.extend(
                source
                    .keys()
                    .into_iter()
                    .filter(|key| key != DEFAULT_EXPORT)
                    .map(|key| {
                        let accessor = reexport(source, key.clone());
                        (key, accessor)
                    }),
            );
        }
    }
    let default_value = value.clone();
    forwarded.push((
        DEFAULT_EXPORT.to_string(),
        Arc::new(move || default_value.clone()),
    ));

    define_exports(&namespace, forwarded);
    Ok(Value::Namespace(namespace))
}

fn module_id_of(value: &Value) -> Option<ModuleId> {
    match value {
        Value::String(s) => Some(ModuleId::new(s.to_string())),
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(ModuleId::new(format!("{}", *n as u64))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::{factory, FactoryMap};

    #[test]
    fn test_compat_default_for_es_module() {
        let exports = Exports::new();
        exports.set(DEFAULT_EXPORT, "main");
        mark_es_module(&exports);

        let getter = compat_default(&exports);
        assert_eq!(getter(), Value::from("main"));
        exports.set(DEFAULT_EXPORT, "changed");
        assert_eq!(getter(), Value::from("changed"));
    }

    #[test]
    fn test_compat_default_for_plain_module() {
        let exports = Exports::new();
        exports.set("helper", 1);
        let getter = compat_default(&exports);
        assert_eq!(getter(), Value::Namespace(exports));
    }

    #[test]
    fn test_define_exports_is_live_and_first_wins() {
        let source = Exports::new();
        source.set("answer", 41);
        let target = Exports::new();
        target.set("kept", true);

        define_exports(
            &target,
            vec![
                ("answer", reexport(&source, "answer")),
                ("kept", reexport(&source, "answer")),
            ],
        );

        source.set("answer", 42);
        assert_eq!(target.get("answer"), Value::from(42));
        assert_eq!(target.get("kept"), Value::Bool(true));
    }

    #[test]
    fn test_fake_namespace_copies_properties() {
        let registry = ModuleRegistry::new();
        let source = Exports::new();
        source.set("a", 1);

        let ns = create_fake_namespace(
            &registry,
            Value::Namespace(source.clone()),
            NamespaceMode::COPY_PROPERTIES,
        )
        .unwrap();
        let ns = ns.as_namespace().unwrap();

        assert!(ns.is_es_module());
        source.set("a", 2);
        assert_eq!(ns.get("a"), Value::from(2));
        assert_eq!(ns.get(DEFAULT_EXPORT), Value::Namespace(source));
    }

    #[test]
    fn test_fake_namespace_passthrough_and_require() {
        let registry = ModuleRegistry::new();
        let mut factories = FactoryMap::new();
        factories.insert(
            ModuleId::from(12),
            factory(|_, exports, _| {
                exports.mark_es_module();
                exports.set(DEFAULT_EXPORT, "twelve");
                Ok(())
            }),
        );
        registry.install_factories(factories);

        let ns = create_fake_namespace(
            &registry,
            Value::from(12),
            NamespaceMode::REQUIRE | NamespaceMode::ES_MODULE_PASSTHROUGH,
        )
        .unwrap();
        let required = registry.require(12).unwrap();
        assert_eq!(ns, Value::Namespace(required));

        let raw = create_fake_namespace(&registry, Value::from("x"), NamespaceMode::AS_IS).unwrap();
        assert_eq!(raw, Value::from("x"));
    }

    #[test]
    fn test_fake_namespace_rejects_non_id_under_require() {
        let registry = ModuleRegistry::new();
        for value in [Value::from(true), Value::Null, Value::from(-1)] {
            let result = create_fake_namespace(&registry, value, NamespaceMode::REQUIRE);
            assert!(matches!(result, Err(ModuleError::InvalidModuleId(_))));
        }
    }

    #[test]
    fn test_fake_namespace_wraps_scalar() {
        let registry = ModuleRegistry::new();
        let ns = create_fake_namespace(&registry, Value::from(3), NamespaceMode::empty()).unwrap();
        let ns = ns.as_namespace().unwrap();
        assert_eq!(ns.keys(), vec![DEFAULT_EXPORT.to_string()]);
        assert_eq!(ns.get(DEFAULT_EXPORT), Value::from(3));
    }
}
