//! Dependency edges
//!
//! A [`DependencySpec`] describes one edge of the module graph on the
//! builder side; at definition time each spec is materialized into a
//! [`Dependency`]. Module targets stay identifier handles resolved through
//! the owning registry on use, so materialization never loads anything.

use crate::error::{ModuleError, Result};
use crate::filter::PathFilter;
use crate::ident::ModuleIdentifier;
use crate::loader::ModuleLoader;
use crate::module::Module;
use crate::resource::LocalLoader;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Builder-side description of a single dependency.
///
/// Every spec carries a non-null import filter (default accept-all) and
/// export filter (default reject-all); the filters gate which paths cross
/// the edge in each direction.
#[derive(Clone)]
pub enum DependencySpec {
    /// Dependency on local content: the module's own resources when no
    /// loader is given, an external [`LocalLoader`] otherwise
    Local {
        /// Gates which paths enter the module via this edge
        import_filter: PathFilter,
        /// Gates which paths leave the module via this edge
        export_filter: PathFilter,
        /// External content provider; `None` means the module's own roots
        loader: Option<Arc<dyn LocalLoader>>,
        /// Paths offered by an external provider; `None` means the module's
        /// own path set as computed at link time
        loader_paths: Option<FxHashSet<String>>,
    },
    /// Dependency on another module
    Module {
        /// Gates which paths enter the module via this edge
        import_filter: PathFilter,
        /// Gates which paths leave the module via this edge
        export_filter: PathFilter,
        /// Loader to acquire the target from; `None` means the owning loader
        loader: Option<Arc<ModuleLoader>>,
        /// Target module identifier, resolved verbatim
        identifier: ModuleIdentifier,
        /// Whether a missing target is tolerated
        optional: bool,
    },
}

impl DependencySpec {
    /// A fully visible, fully re-exported dependency on the module's own
    /// resources. Any module with its own content should carry one.
    pub fn local() -> Self {
        DependencySpec::Local {
            import_filter: PathFilter::accept_all(),
            export_filter: PathFilter::accept_all(),
            loader: None,
            loader_paths: None,
        }
    }

    /// A dependency on the module's own resources with explicit filters
    pub fn local_with_filters(import_filter: PathFilter, export_filter: PathFilter) -> Self {
        DependencySpec::Local {
            import_filter,
            export_filter,
            loader: None,
            loader_paths: None,
        }
    }

    /// A non-exported dependency on an external local loader
    pub fn on_local_loader(loader: Arc<dyn LocalLoader>, loader_paths: FxHashSet<String>) -> Self {
        DependencySpec::Local {
            import_filter: PathFilter::accept_all(),
            export_filter: PathFilter::reject_all(),
            loader: Some(loader),
            loader_paths: Some(loader_paths),
        }
    }

    /// A dependency on an external local loader with explicit filters
    pub fn on_local_loader_filtered(
        import_filter: PathFilter,
        export_filter: PathFilter,
        loader: Arc<dyn LocalLoader>,
        loader_paths: FxHashSet<String>,
    ) -> Self {
        DependencySpec::Local {
            import_filter,
            export_filter,
            loader: Some(loader),
            loader_paths: Some(loader_paths),
        }
    }

    /// A non-exported, mandatory dependency on another module
    pub fn on_module(identifier: ModuleIdentifier) -> Self {
        Self::module_dependency(identifier).build()
    }

    /// Start building a module dependency
    pub fn module_dependency(identifier: ModuleIdentifier) -> ModuleDependencyBuilder {
        ModuleDependencyBuilder {
            identifier,
            loader: None,
            export: false,
            optional: false,
            import_filter: None,
            export_filter: None,
        }
    }

    /// Materialize this spec against the module it belongs to
    pub(crate) fn materialize(&self, module: &Arc<Module>) -> Dependency {
        match self {
            DependencySpec::Local {
                import_filter,
                export_filter,
                loader,
                loader_paths,
            } => Dependency::Local(LocalDependency {
                import_filter: import_filter.clone(),
                export_filter: export_filter.clone(),
                loader: match loader {
                    Some(loader) => loader.clone(),
                    None => module.namespace().clone() as Arc<dyn LocalLoader>,
                },
                paths: loader_paths.as_ref().map(|p| Arc::new(p.clone())),
            }),
            DependencySpec::Module {
                import_filter,
                export_filter,
                loader,
                identifier,
                optional,
            } => Dependency::Module(ModuleDependency {
                import_filter: import_filter.clone(),
                export_filter: export_filter.clone(),
                loader: loader.clone(),
                identifier: identifier.clone(),
                optional: *optional,
            }),
        }
    }
}

impl fmt::Debug for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencySpec::Local { loader: None, .. } => {
                write!(f, "dependency on local resources")
            }
            DependencySpec::Local { loader: Some(_), .. } => {
                write!(f, "dependency on external local loader")
            }
            DependencySpec::Module {
                identifier,
                optional,
                ..
            } => {
                write!(f, "dependency on {}", identifier)?;
                if *optional {
                    write!(f, " (optional)")?;
                }
                Ok(())
            }
        }
    }
}

/// Builder for a module dependency spec
#[derive(Debug)]
pub struct ModuleDependencyBuilder {
    identifier: ModuleIdentifier,
    loader: Option<Arc<ModuleLoader>>,
    export: bool,
    optional: bool,
    import_filter: Option<PathFilter>,
    export_filter: Option<PathFilter>,
}

impl ModuleDependencyBuilder {
    /// Acquire the target from a specific loader instead of the owning one
    pub fn loader(mut self, loader: Arc<ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Fully re-export the target's visible paths
    pub fn export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Tolerate a missing target
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Replace the default accept-all import filter
    pub fn import_filter(mut self, filter: PathFilter) -> Self {
        self.import_filter = Some(filter);
        self
    }

    /// Replace the export filter implied by [`export`](Self::export)
    pub fn export_filter(mut self, filter: PathFilter) -> Self {
        self.export_filter = Some(filter);
        self
    }

    /// Produce the dependency spec
    pub fn build(self) -> DependencySpec {
        let export_filter = self.export_filter.unwrap_or_else(|| {
            if self.export {
                PathFilter::accept_all()
            } else {
                PathFilter::reject_all()
            }
        });
        DependencySpec::Module {
            import_filter: self.import_filter.unwrap_or_else(PathFilter::accept_all),
            export_filter,
            loader: self.loader,
            identifier: self.identifier,
            optional: self.optional,
        }
    }
}

/// A materialized dependency edge
#[derive(Clone)]
pub enum Dependency {
    /// Edge to a local content provider
    Local(LocalDependency),
    /// Edge to another module, resolved through a registry on use
    Module(ModuleDependency),
}

impl Dependency {
    /// The filter gating inbound visibility on this edge
    pub fn import_filter(&self) -> &PathFilter {
        match self {
            Dependency::Local(dep) => &dep.import_filter,
            Dependency::Module(dep) => &dep.import_filter,
        }
    }

    /// The filter gating outbound (re-export) visibility on this edge
    pub fn export_filter(&self) -> &PathFilter {
        match self {
            Dependency::Local(dep) => &dep.export_filter,
            Dependency::Module(dep) => &dep.export_filter,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Local(_) => write!(f, "local dependency"),
            Dependency::Module(dep) => write!(f, "module dependency on {}", dep.identifier),
        }
    }
}

/// Edge to a local content provider
#[derive(Clone)]
pub struct LocalDependency {
    import_filter: PathFilter,
    export_filter: PathFilter,
    loader: Arc<dyn LocalLoader>,
    paths: Option<Arc<FxHashSet<String>>>,
}

impl LocalDependency {
    /// The content provider behind this edge
    pub fn loader(&self) -> &Arc<dyn LocalLoader> {
        &self.loader
    }

    /// The paths this edge can offer: the explicit set captured at build
    /// time, or the provider's live path set
    pub fn paths(&self) -> Arc<FxHashSet<String>> {
        match &self.paths {
            Some(paths) => paths.clone(),
            None => self.loader.paths(),
        }
    }

    /// Identity of the underlying provider, for per-provider deduplication
    pub(crate) fn provider_key(&self) -> usize {
        Arc::as_ptr(&self.loader) as *const () as usize
    }
}

/// Edge to another module
#[derive(Clone)]
pub struct ModuleDependency {
    import_filter: PathFilter,
    export_filter: PathFilter,
    loader: Option<Arc<ModuleLoader>>,
    identifier: ModuleIdentifier,
    optional: bool,
}

impl ModuleDependency {
    /// The target module identifier
    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    /// Whether a missing target is tolerated
    pub fn optional(&self) -> bool {
        self.optional
    }

    /// Resolve the target through its loader.
    ///
    /// `Ok(None)` means the edge is silent: the target is missing and the
    /// dependency is optional. A missing mandatory target is an error.
    pub(crate) fn resolve(&self, owner: &Module) -> Result<Option<Arc<Module>>> {
        let loader = match &self.loader {
            Some(loader) => loader.clone(),
            None => owner.loader().ok_or_else(|| ModuleError::ModuleNotFound {
                id: self.identifier.clone(),
            })?,
        };
        match loader.preload_module(&self.identifier) {
            Ok(module) => Ok(Some(module)),
            Err(ModuleError::ModuleNotFound { .. }) if self.optional => Ok(None),
            Err(e) => Err(e),
        }
    }
}
