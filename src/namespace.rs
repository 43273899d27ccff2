//! Per-module symbol and resource resolution
//!
//! Every query maps the user-visible name to a path token first: the token
//! of symbol `a.b.c.Foo` is `a/b/c`, the token of a resource is its
//! containing directory. Filtering always operates on that token. Global
//! queries walk the module's dependency array in author order; exported
//! queries iterate the precomputed re-export table. Both carry a
//! per-invocation visited set so dependency cycles terminate.

use crate::dependency::Dependency;
use crate::module::{visit_key, Module, VisitSet};
use crate::resource::{parent_path, symbol_path, LocalLoader, Resource, Symbol};
use crate::spec::ResourceRoot;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// The namespace of one module: local content presented together with
/// imported content as a single logical view.
pub struct Namespace {
    module: Weak<Module>,
    roots: RwLock<Vec<ResourceRoot>>,
    paths: RwLock<Arc<FxHashSet<String>>>,
}

impl Namespace {
    pub(crate) fn new(module: Weak<Module>, roots: Vec<ResourceRoot>) -> Self {
        Self {
            module,
            roots: RwLock::new(roots),
            paths: RwLock::new(Arc::new(FxHashSet::default())),
        }
    }

    /// Recompute the path set from the current resource roots
    pub(crate) fn recalculate(&self) {
        let mut paths = FxHashSet::default();
        {
            let roots = self.roots.read();
            for root in roots.iter() {
                for path in root.loader().paths() {
                    if root.filter().accept(&path) {
                        paths.insert(path);
                    }
                }
            }
        }
        *self.paths.write() = Arc::new(paths);
    }

    /// Replace the resource roots; the caller recalculates afterwards
    pub(crate) fn set_roots(&self, roots: Vec<ResourceRoot>) {
        *self.roots.write() = roots;
    }

    /// The directory paths this namespace's own roots answer for
    pub fn local_paths(&self) -> Arc<FxHashSet<String>> {
        self.paths.read().clone()
    }

    /// Resolve a symbol through local content and imports
    pub fn load_symbol(&self, name: &str) -> Option<Symbol> {
        let module = self.module.upgrade()?;
        let mut visited = VisitSet::default();
        Self::find_symbol_in(&module, name, &mut visited)
    }

    /// Resolve a symbol the way a consumer of this module would see it:
    /// through re-exporting edges only
    pub fn load_exported_symbol(&self, name: &str) -> Option<Symbol> {
        let module = self.module.upgrade()?;
        let mut visited = VisitSet::default();
        Self::find_exported_symbol_in(&module, name, &mut visited)
    }

    /// Open a resource through local content and imports
    pub fn resource(&self, path: &str) -> Option<Resource> {
        let module = self.module.upgrade()?;
        let mut visited = VisitSet::default();
        Self::find_resource_in(&module, path, &mut visited)
    }

    /// Open a resource through re-exporting edges only
    pub fn exported_resource(&self, path: &str) -> Option<Resource> {
        let module = self.module.upgrade()?;
        let mut visited = VisitSet::default();
        Self::find_exported_resource_in(&module, path, &mut visited)
    }

    /// Enumerate every visible resource at the path, in traversal order,
    /// once per distinct underlying provider
    pub fn resources(&self, path: &str) -> Vec<Resource> {
        let mut found = Vec::new();
        if let Some(module) = self.module.upgrade() {
            let mut visited = VisitSet::default();
            let mut providers = FxHashSet::default();
            Self::collect_resources_in(&module, path, &mut visited, &mut providers, &mut found);
        }
        found
    }

    /// Enumerate every re-exported resource at the path
    pub fn exported_resources(&self, path: &str) -> Vec<Resource> {
        let mut found = Vec::new();
        if let Some(module) = self.module.upgrade() {
            let mut visited = VisitSet::default();
            let mut providers = FxHashSet::default();
            Self::collect_exported_resources_in(
                &module,
                path,
                &mut visited,
                &mut providers,
                &mut found,
            );
        }
        found
    }

    fn find_symbol_in(module: &Arc<Module>, name: &str, visited: &mut VisitSet) -> Option<Symbol> {
        if !visited.insert(visit_key(module)) {
            return None;
        }
        let token = symbol_path(name);
        for dependency in module.dependencies().iter() {
            if !dependency.import_filter().accept(&token) {
                continue;
            }
            match dependency {
                Dependency::Local(local) => {
                    if let Some(symbol) = local.loader().load_symbol_local(name) {
                        return Some(symbol);
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(module).ok().flatten() else {
                        continue;
                    };
                    if visited.contains(&visit_key(&target)) {
                        continue;
                    }
                    if let Some(symbol) = Self::find_exported_symbol_in(&target, name, visited) {
                        return Some(symbol);
                    }
                }
            }
        }
        None
    }

    fn find_exported_symbol_in(
        module: &Arc<Module>,
        name: &str,
        visited: &mut VisitSet,
    ) -> Option<Symbol> {
        if !visited.insert(visit_key(module)) {
            return None;
        }
        if !ensure_linked(module) {
            return None;
        }
        let token = symbol_path(name);
        let table = module.exported_paths();
        for dependency in table.get(&token)? {
            if !dependency.export_filter().accept(&token) {
                continue;
            }
            match dependency {
                Dependency::Local(local) => {
                    if let Some(symbol) = local.loader().load_symbol_local(name) {
                        return Some(symbol);
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(module).ok().flatten() else {
                        continue;
                    };
                    if visited.contains(&visit_key(&target)) {
                        continue;
                    }
                    if let Some(symbol) = Self::find_exported_symbol_in(&target, name, visited) {
                        return Some(symbol);
                    }
                }
            }
        }
        None
    }

    fn find_resource_in(module: &Arc<Module>, path: &str, visited: &mut VisitSet) -> Option<Resource> {
        if !visited.insert(visit_key(module)) {
            return None;
        }
        let token = parent_path(path);
        for dependency in module.dependencies().iter() {
            if !dependency.import_filter().accept(token) {
                continue;
            }
            match dependency {
                Dependency::Local(local) => {
                    if let Some(resource) = local.loader().load_resource_local(path) {
                        return Some(resource);
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(module).ok().flatten() else {
                        continue;
                    };
                    if visited.contains(&visit_key(&target)) {
                        continue;
                    }
                    if let Some(resource) = Self::find_exported_resource_in(&target, path, visited)
                    {
                        return Some(resource);
                    }
                }
            }
        }
        None
    }

    fn find_exported_resource_in(
        module: &Arc<Module>,
        path: &str,
        visited: &mut VisitSet,
    ) -> Option<Resource> {
        if !visited.insert(visit_key(module)) {
            return None;
        }
        if !ensure_linked(module) {
            return None;
        }
        let token = parent_path(path);
        let table = module.exported_paths();
        for dependency in table.get(token)? {
            if !dependency.export_filter().accept(token) {
                continue;
            }
            match dependency {
                Dependency::Local(local) => {
                    if let Some(resource) = local.loader().load_resource_local(path) {
                        return Some(resource);
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(module).ok().flatten() else {
                        continue;
                    };
                    if visited.contains(&visit_key(&target)) {
                        continue;
                    }
                    if let Some(resource) = Self::find_exported_resource_in(&target, path, visited)
                    {
                        return Some(resource);
                    }
                }
            }
        }
        None
    }

    fn collect_resources_in(
        module: &Arc<Module>,
        path: &str,
        visited: &mut VisitSet,
        providers: &mut FxHashSet<usize>,
        found: &mut Vec<Resource>,
    ) {
        if !visited.insert(visit_key(module)) {
            return;
        }
        let token = parent_path(path);
        for dependency in module.dependencies().iter() {
            if !dependency.import_filter().accept(token) {
                continue;
            }
            match dependency {
                Dependency::Local(local) => {
                    if providers.insert(local.provider_key()) {
                        found.extend(local.loader().load_resources_local(path));
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(module).ok().flatten() else {
                        continue;
                    };
                    if visited.contains(&visit_key(&target)) {
                        continue;
                    }
                    Self::collect_exported_resources_in(&target, path, visited, providers, found);
                }
            }
        }
    }

    fn collect_exported_resources_in(
        module: &Arc<Module>,
        path: &str,
        visited: &mut VisitSet,
        providers: &mut FxHashSet<usize>,
        found: &mut Vec<Resource>,
    ) {
        if !visited.insert(visit_key(module)) {
            return;
        }
        if !ensure_linked(module) {
            return;
        }
        let token = parent_path(path);
        let table = module.exported_paths();
        let Some(entries) = table.get(token) else {
            return;
        };
        for dependency in entries {
            if !dependency.export_filter().accept(token) {
                continue;
            }
            match dependency {
                Dependency::Local(local) => {
                    if providers.insert(local.provider_key()) {
                        found.extend(local.loader().load_resources_local(path));
                    }
                }
                Dependency::Module(module_dep) => {
                    let Some(target) = module_dep.resolve(module).ok().flatten() else {
                        continue;
                    };
                    if visited.contains(&visit_key(&target)) {
                        continue;
                    }
                    Self::collect_exported_resources_in(&target, path, visited, providers, found);
                }
            }
        }
    }
}

/// Link on demand; a failure is a visibility miss, not a query error
fn ensure_linked(module: &Arc<Module>) -> bool {
    if module.is_linked() {
        return true;
    }
    let mut visited = VisitSet::default();
    match module.link_exports_if_needed(&mut visited) {
        Ok(()) => true,
        Err(e) => {
            debug!(module = %module.identifier(), error = %e, "export linking failed during resolution");
            false
        }
    }
}

impl LocalLoader for Namespace {
    fn paths(&self) -> Arc<FxHashSet<String>> {
        self.local_paths()
    }

    fn load_symbol_local(&self, name: &str) -> Option<Symbol> {
        let token = symbol_path(name);
        let roots = self.roots.read();
        roots.iter().find_map(|root| {
            if root.filter().accept(&token) {
                root.loader().find_symbol(name)
            } else {
                None
            }
        })
    }

    fn load_resource_local(&self, path: &str) -> Option<Resource> {
        let token = parent_path(path);
        let roots = self.roots.read();
        roots.iter().find_map(|root| {
            if root.filter().accept(token) {
                root.loader().find_resource(path)
            } else {
                None
            }
        })
    }

    fn load_resources_local(&self, path: &str) -> Vec<Resource> {
        let token = parent_path(path);
        let roots = self.roots.read();
        roots
            .iter()
            .filter(|root| root.filter().accept(token))
            .filter_map(|root| root.loader().find_resource(path))
            .collect()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roots = self.roots.read();
        let names: Vec<&str> = roots.iter().map(|r| r.name()).collect();
        f.debug_struct("Namespace").field("roots", &names).finish()
    }
}
