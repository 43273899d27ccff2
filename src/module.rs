//! Live modules and export linking

use crate::dependency::{Dependency, DependencySpec};
use crate::error::Result;
use crate::ident::ModuleIdentifier;
use crate::loader::ModuleLoader;
use crate::namespace::Namespace;
use crate::spec::ModuleSpec;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Per-invocation set of module identities, used to terminate recursion on
/// dependency cycles
pub(crate) type VisitSet = FxHashSet<usize>;

pub(crate) fn visit_key(module: &Arc<Module>) -> usize {
    Arc::as_ptr(module) as usize
}

/// A named unit of loadable content with its own isolated namespace.
///
/// Modules are created by their owning [`ModuleLoader`] and shared as
/// `Arc<Module>`; once linked, a module's fields are effectively immutable
/// and safe for concurrent reads. Administrative loader operations are the
/// only writers.
pub struct Module {
    identifier: ModuleIdentifier,
    main_symbol: Option<String>,
    loader: Weak<ModuleLoader>,
    namespace: Arc<Namespace>,
    dependencies: RwLock<Arc<Vec<Dependency>>>,
    exported_paths: RwLock<Arc<FxHashMap<String, Vec<Dependency>>>>,
    linked: AtomicBool,
}

impl Module {
    /// Construct an unlinked module from its spec. The dependency specs are
    /// returned for the caller to materialize once the `Arc` exists.
    pub(crate) fn from_spec(
        spec: ModuleSpec,
        loader: Weak<ModuleLoader>,
    ) -> (Arc<Module>, Vec<DependencySpec>) {
        let (identifier, main_symbol, resource_roots, dependency_specs) = spec.into_parts();
        let module = Arc::new_cyclic(|weak: &Weak<Module>| Module {
            identifier,
            main_symbol,
            loader,
            namespace: Arc::new(Namespace::new(weak.clone(), resource_roots)),
            dependencies: RwLock::new(Arc::new(Vec::new())),
            exported_paths: RwLock::new(Arc::new(FxHashMap::default())),
            linked: AtomicBool::new(false),
        });
        (module, dependency_specs)
    }

    /// The module identifier
    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    /// The declared entry symbol, if any
    pub fn main_symbol(&self) -> Option<&str> {
        self.main_symbol.as_deref()
    }

    /// The namespace answering symbol and resource queries for this module
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// The loader that owns this module, if it is still alive
    pub fn loader(&self) -> Option<Arc<ModuleLoader>> {
        self.loader.upgrade()
    }

    pub(crate) fn is_owned_by(&self, loader: &ModuleLoader) -> bool {
        std::ptr::eq(self.loader.as_ptr(), loader)
    }

    /// Snapshot of the materialized dependency array, in author order
    pub fn dependencies(&self) -> Arc<Vec<Dependency>> {
        self.dependencies.read().clone()
    }

    /// The directory paths offered by this module's own resource roots
    pub fn local_paths(&self) -> Arc<FxHashSet<String>> {
        self.namespace.local_paths()
    }

    /// Whether export linking has completed
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    /// Snapshot of the re-export table: path to the ordered dependencies
    /// through which that path is visible from consumers
    pub(crate) fn exported_paths(&self) -> Arc<FxHashMap<String, Vec<Dependency>>> {
        self.exported_paths.read().clone()
    }

    /// Replace the dependency array by materializing the given specs
    pub(crate) fn set_dependencies(self: &Arc<Self>, specs: Vec<DependencySpec>) {
        let dependencies: Vec<Dependency> =
            specs.iter().map(|spec| spec.materialize(self)).collect();
        *self.dependencies.write() = Arc::new(dependencies);
    }

    /// Compute and publish the re-export table if that has not happened yet.
    ///
    /// Idempotent: repeated calls observe the same table until an explicit
    /// [`relink`](Self::relink).
    pub(crate) fn link_exports_if_needed(self: &Arc<Self>, visited: &mut VisitSet) -> Result<()> {
        if self.is_linked() {
            return Ok(());
        }
        let table = self.compute_exported_paths(visited)?;
        debug!(module = %self.identifier, paths = table.len(), "linked exports");
        *self.exported_paths.write() = Arc::new(table);
        self.linked.store(true, Ordering::Release);
        Ok(())
    }

    /// Gather the paths this module re-exports by walking its dependency
    /// array. Module edges whose target is already linked contribute their
    /// published table; unlinked targets are traversed recursively without
    /// publishing, so a module whose own traversal was cut short by a cycle
    /// still gets a complete table when it links itself later. Any path
    /// reachable only through the cycle is reachable through an acyclic
    /// prefix of it, so skipping visited targets loses nothing.
    fn compute_exported_paths(
        self: &Arc<Self>,
        visited: &mut VisitSet,
    ) -> Result<FxHashMap<String, Vec<Dependency>>> {
        visited.insert(visit_key(self));
        let mut table: FxHashMap<String, Vec<Dependency>> = FxHashMap::default();
        let dependencies = self.dependencies();
        for dependency in dependencies.iter() {
            match dependency {
                Dependency::Local(local) => {
                    for path in local.paths().iter() {
                        if dependency.export_filter().accept(path) {
                            table
                                .entry(path.clone())
                                .or_default()
                                .push(dependency.clone());
                        }
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(self)? else {
                        continue;
                    };
                    let target_table = if target.is_linked() {
                        target.exported_paths()
                    } else if visited.contains(&visit_key(&target)) {
                        continue;
                    } else {
                        Arc::new(target.compute_exported_paths(visited)?)
                    };
                    for (path, entries) in target_table.iter() {
                        if dependency.import_filter().accept(path)
                            && dependency.export_filter().accept(path)
                        {
                            table
                                .entry(path.clone())
                                .or_default()
                                .extend(entries.iter().cloned());
                        }
                    }
                }
            }
        }
        Ok(table)
    }

    /// Discard the published re-export table and rebuild it
    pub(crate) fn relink(self: &Arc<Self>) -> Result<()> {
        self.linked.store(false, Ordering::Release);
        let mut visited = VisitSet::default();
        self.link_exports_if_needed(&mut visited)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("identifier", &self.identifier)
            .field("linked", &self.is_linked())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module {}", self.identifier)
    }
}
