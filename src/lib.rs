//! Modular code-loading runtime
//!
//! This crate partitions a body of loadable content into named, versioned
//! modules, each with an isolated namespace, and resolves symbol and
//! resource lookups across an explicit graph of inter-module dependencies.
//! It provides:
//! - A concurrent module registry with one-shot lazy definition
//! - Per-edge import/export path filters gating visibility
//! - Namespaces presenting local and imported content as a single view
//! - Export linking with cycle-safe graph traversal
//! - Directory, archive, and in-memory content backends
//! - A validating `module.xml` descriptor parser
//!
//! # Example
//!
//! ```
//! use modlink::{
//!     DependencySpec, MemoryResourceLoader, ModuleLoader, ModuleSpec, ResourceRoot, StaticFinder,
//! };
//! use std::sync::Arc;
//!
//! let finder = StaticFinder::new();
//! let root = Arc::new(
//!     MemoryResourceLoader::build("rootOne")
//!         .symbol("org.acme.Widget", b"widget".to_vec())
//!         .create(),
//! );
//! let mut builder = ModuleSpec::build("org.acme:widgets".parse().unwrap());
//! builder.add_root(ResourceRoot::new("rootOne", root));
//! builder.add_dependency(DependencySpec::local());
//! finder.add_spec(builder.create());
//!
//! let loader = ModuleLoader::new(Box::new(finder));
//! let module = loader.load_module(&"org.acme:widgets".parse().unwrap()).unwrap();
//! let symbol = module.namespace().load_symbol("org.acme.Widget").unwrap();
//! assert_eq!(symbol.bytes(), b"widget");
//! ```

pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod fs;
pub mod ident;
pub mod loader;
pub mod module;
pub mod namespace;
pub mod resource;
pub mod spec;

pub use dependency::{Dependency, DependencySpec, LocalDependency, ModuleDependency};
pub use error::{ModuleError, Result};
pub use filter::{MultiplePathFilterBuilder, PathFilter};
pub use fs::{ArchiveResourceLoader, FileFinder, FileResourceLoader};
pub use ident::ModuleIdentifier;
pub use loader::{LoaderConfig, ModuleFinder, ModuleLoader, StaticFinder};
pub use module::Module;
pub use namespace::Namespace;
pub use resource::{
    LocalLoader, MemoryResourceLoader, MemoryResourceLoaderBuilder, Resource, ResourceLoader,
    SimpleLocalLoader, Symbol,
};
pub use spec::{ModuleSpec, ModuleSpecBuilder, ResourceRoot};
