//! Module loader registry
//!
//! A [`ModuleLoader`] maps identifiers to live modules with one-shot lazy
//! definition under concurrent load: for any `(loader, identifier)` pair at
//! most one [`Module`] is ever defined, and every caller observes that same
//! instance. Loading policy is injected through the [`ModuleFinder`] hook.

use crate::dependency::DependencySpec;
use crate::error::{ModuleError, Result};
use crate::ident::ModuleIdentifier;
use crate::module::{Module, VisitSet};
use crate::spec::{ModuleSpec, ResourceRoot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Loading policy for a [`ModuleLoader`].
///
/// `find_module` produces the spec for an identifier; it is invoked at most
/// once per identifier while the loader holds the pending registry entry,
/// and may block on I/O. `delegate` lets a composite loader route an
/// identifier to another loader entirely.
pub trait ModuleFinder: Send + Sync {
    /// Find a module's spec by identifier; `Ok(None)` when this loader has
    /// no module with that identifier
    fn find_module(&self, id: &ModuleIdentifier) -> Result<Option<ModuleSpec>>;

    /// Choose another loader responsible for the identifier, if any
    fn delegate(&self, id: &ModuleIdentifier) -> Option<Arc<ModuleLoader>> {
        let _ = id;
        None
    }
}

/// Configuration for a [`ModuleLoader`]
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Loader name used in logging and diagnostics
    pub name: String,
    /// Whether administrative redefinition operations are permitted
    pub can_redefine: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            name: "module-loader".to_string(),
            can_redefine: true,
        }
    }
}

/// Registry of live modules, keyed by identifier
pub struct ModuleLoader {
    name: String,
    can_redefine: bool,
    finder: Box<dyn ModuleFinder>,
    registry: DashMap<ModuleIdentifier, Arc<FutureModule>>,
}

impl ModuleLoader {
    /// Create a loader with default configuration
    pub fn new(finder: Box<dyn ModuleFinder>) -> Arc<Self> {
        Self::with_config(LoaderConfig::default(), finder)
    }

    /// Create a loader with explicit configuration
    pub fn with_config(config: LoaderConfig, finder: Box<dyn ModuleFinder>) -> Arc<Self> {
        Arc::new(Self {
            name: config.name,
            can_redefine: config.can_redefine,
            finder,
            registry: DashMap::new(),
        })
    }

    /// The loader's diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load a module and link its exports.
    ///
    /// Equivalent to [`preload_module`](Self::preload_module) followed by
    /// export linking; loading the same identifier twice returns the same
    /// instance.
    pub fn load_module(self: &Arc<Self>, id: &ModuleIdentifier) -> Result<Arc<Module>> {
        let module = self.preload_module(id)?;
        let mut visited = VisitSet::default();
        module.link_exports_if_needed(&mut visited)?;
        Ok(module)
    }

    /// Load a module without linking its exports.
    ///
    /// Consults [`ModuleFinder::delegate`] first, so a composite loader may
    /// route the identifier elsewhere; otherwise loads locally.
    pub fn preload_module(self: &Arc<Self>, id: &ModuleIdentifier) -> Result<Arc<Module>> {
        if let Some(delegate) = self.finder.delegate(id) {
            return delegate.preload_module(id);
        }
        match self.load_module_local(id)? {
            Some(module) => Ok(module),
            None => Err(ModuleError::ModuleNotFound { id: id.clone() }),
        }
    }

    /// Try to load a module from this loader only. Returns `Ok(None)` if the
    /// finder has no module with the identifier.
    pub fn load_module_local(self: &Arc<Self>, id: &ModuleIdentifier) -> Result<Option<Arc<Module>>> {
        enum Claim {
            Wait(Arc<FutureModule>),
            Create(Arc<FutureModule>),
        }

        let claim = match self.registry.entry(id.clone()) {
            Entry::Occupied(entry) => Claim::Wait(entry.get().clone()),
            Entry::Vacant(entry) => {
                let future = Arc::new(FutureModule::new(id.clone()));
                entry.insert(future.clone());
                Claim::Create(future)
            }
        };

        let future = match claim {
            // Another thread is (or was) the definer; wait for its outcome.
            Claim::Wait(future) => return Ok(future.wait()),
            Claim::Create(future) => future,
        };

        trace!(module = %id, loader = %self.name, "locally loading module");
        match self.find_and_define(id) {
            Ok(Some(module)) => {
                future.publish(Some(module.clone()))?;
                trace!(module = %id, loader = %self.name, "loaded module");
                Ok(Some(module))
            }
            Ok(None) => {
                let _ = future.publish(None);
                self.evict(id, &future);
                trace!(module = %id, loader = %self.name, "module not found");
                Ok(None)
            }
            Err(e) => {
                let _ = future.publish(None);
                self.evict(id, &future);
                debug!(module = %id, loader = %self.name, error = %e, "failed to load module");
                Err(e)
            }
        }
    }

    /// Remove a module's registry entry.
    ///
    /// Live references remain valid and already-linked consumers keep
    /// functioning; only future lookups are affected. Unloading a module
    /// owned by a different loader is rejected.
    pub fn unload_module_local(self: &Arc<Self>, module: &Arc<Module>) -> Result<()> {
        if !module.is_owned_by(self) {
            return Err(ModuleError::PermissionDenied {
                operation: format!("unload {} from a different loader", module.identifier()),
            });
        }
        self.registry
            .remove_if(module.identifier(), |_, future| future.is_resolved_to(module));
        debug!(module = %module.identifier(), loader = %self.name, "unloaded module");
        Ok(())
    }

    /// Recompute the path set of a live module from its current roots
    pub fn refresh_resource_loaders(&self, module: &Arc<Module>) -> Result<()> {
        self.check_redefine("refresh resource loaders")?;
        module.namespace().recalculate();
        Ok(())
    }

    /// Replace a live module's resource roots and recompute its path set.
    ///
    /// Modules importing from this module are not updated automatically;
    /// call [`relink`](Self::relink) on each of them.
    pub fn set_and_refresh_resource_loaders(
        &self,
        module: &Arc<Module>,
        roots: Vec<ResourceRoot>,
    ) -> Result<()> {
        self.check_redefine("replace resource loaders")?;
        module.namespace().set_roots(roots);
        module.namespace().recalculate();
        Ok(())
    }

    /// Rebuild a live module's re-export table
    pub fn relink(&self, module: &Arc<Module>) -> Result<()> {
        self.check_redefine("relink")?;
        module.relink()
    }

    /// Replace a live module's dependency list and rebuild its re-export
    /// table. Dependents observe the change only after their own relink.
    pub fn set_and_relink_dependencies(
        &self,
        module: &Arc<Module>,
        dependencies: Vec<DependencySpec>,
    ) -> Result<()> {
        self.check_redefine("replace dependencies")?;
        module.set_dependencies(dependencies);
        module.relink()
    }

    fn check_redefine(&self, operation: &str) -> Result<()> {
        if self.can_redefine {
            Ok(())
        } else {
            Err(ModuleError::PermissionDenied {
                operation: operation.to_string(),
            })
        }
    }

    fn find_and_define(self: &Arc<Self>, id: &ModuleIdentifier) -> Result<Option<Arc<Module>>> {
        let Some(spec) = self.finder.find_module(id)? else {
            return Ok(None);
        };
        if spec.identifier() != id {
            return Err(ModuleError::NameMismatch {
                requested: id.clone(),
                found: spec.identifier().clone(),
            });
        }
        Ok(Some(self.define_module(spec)))
    }

    /// Construct the module, compute its local paths, and materialize its
    /// dependency array. Module edges stay lazy handles, so definition never
    /// waits on another pending entry.
    fn define_module(self: &Arc<Self>, spec: ModuleSpec) -> Arc<Module> {
        let (module, dependency_specs) = Module::from_spec(spec, Arc::downgrade(self));
        module.namespace().recalculate();
        module.set_dependencies(dependency_specs);
        debug!(module = %module.identifier(), loader = %self.name, "defined module");
        module
    }

    fn evict(&self, id: &ModuleIdentifier, future: &Arc<FutureModule>) {
        self.registry.remove_if(id, |_, entry| Arc::ptr_eq(entry, future));
    }
}

impl fmt::Display for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("name", &self.name)
            .field("modules", &self.registry.len())
            .finish()
    }
}

/// A registry entry with per-key single-publisher semantics: the thread
/// that installs the pending entry is the unique definer, everyone else
/// blocks until it publishes a module or a not-found marker.
struct FutureModule {
    identifier: ModuleIdentifier,
    state: Mutex<FutureState>,
    ready: Condvar,
}

enum FutureState {
    Pending,
    Resolved(Arc<Module>),
    NotFound,
}

impl FutureModule {
    fn new(identifier: ModuleIdentifier) -> Self {
        Self {
            identifier,
            state: Mutex::new(FutureState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Block until the entry reaches a terminal state
    fn wait(&self) -> Option<Arc<Module>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                FutureState::Pending => self.ready.wait(&mut state),
                FutureState::Resolved(module) => return Some(module.clone()),
                FutureState::NotFound => return None,
            }
        }
    }

    /// Publish the terminal state and wake all waiters
    fn publish(&self, module: Option<Arc<Module>>) -> Result<()> {
        let mut state = self.state.lock();
        if !matches!(*state, FutureState::Pending) {
            return Err(ModuleError::DuplicateDefinition {
                id: self.identifier.clone(),
            });
        }
        *state = match module {
            Some(module) => FutureState::Resolved(module),
            None => FutureState::NotFound,
        };
        self.ready.notify_all();
        Ok(())
    }

    fn is_resolved_to(&self, module: &Arc<Module>) -> bool {
        match &*self.state.lock() {
            FutureState::Resolved(resolved) => Arc::ptr_eq(resolved, module),
            _ => false,
        }
    }
}

/// A [`ModuleFinder`] over an explicit set of specs, for embedding and
/// testing
#[derive(Default)]
pub struct StaticFinder {
    specs: RwLock<FxHashMap<ModuleIdentifier, ModuleSpec>>,
}

impl StaticFinder {
    /// Create an empty finder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec under its identifier, replacing any previous one
    pub fn add_spec(&self, spec: ModuleSpec) {
        self.specs.write().insert(spec.identifier().clone(), spec);
    }
}

impl ModuleFinder for StaticFinder {
    fn find_module(&self, id: &ModuleIdentifier) -> Result<Option<ModuleSpec>> {
        Ok(self.specs.read().get(id).cloned())
    }
}
