//! Module registry, export namespaces and interop helpers
//!
//! - **Registry**: factory table plus a cache of instantiated modules
//! - **Values**: shared export namespaces with live accessor bindings
//! - **Interop**: default/namespace normalization and re-export installation

pub mod interop;
pub mod registry;
pub mod value;

pub use interop::{
    compat_default, create_fake_namespace, define_exports, has_own, mark_es_module, reexport,
    NamespaceMode,
};
pub use registry::{factory, FactoryMap, ModuleFactory, ModuleRecord, ModuleRegistry};
pub use value::{Accessor, Exports, Function, Value, DEFAULT_EXPORT};
