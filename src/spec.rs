//! Immutable module descriptions

use crate::dependency::DependencySpec;
use crate::filter::PathFilter;
use crate::ident::ModuleIdentifier;
use crate::resource::ResourceLoader;
use std::fmt;
use std::sync::Arc;

/// One resource root of a module: a backend loader plus the filter gating
/// which of its paths the module exposes at all.
#[derive(Clone)]
pub struct ResourceRoot {
    name: String,
    loader: Arc<dyn ResourceLoader>,
    filter: PathFilter,
}

impl ResourceRoot {
    /// A root exposing every path its loader offers
    pub fn new(name: impl Into<String>, loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            name: name.into(),
            loader,
            filter: PathFilter::accept_all(),
        }
    }

    /// A root exposing only the paths its filter accepts
    pub fn with_filter(
        name: impl Into<String>,
        loader: Arc<dyn ResourceLoader>,
        filter: PathFilter,
    ) -> Self {
        Self {
            name: name.into(),
            loader,
            filter,
        }
    }

    /// The root's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backend loader
    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// The path filter applied to this root's contents
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }
}

impl fmt::Debug for ResourceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRoot")
            .field("name", &self.name)
            .field("root", &self.loader.root_name())
            .field("filter", &self.filter)
            .finish()
    }
}

/// Immutable description of a module: identifier, resource roots, dependency
/// list in author order, and optional main symbol.
#[derive(Clone)]
pub struct ModuleSpec {
    identifier: ModuleIdentifier,
    main_symbol: Option<String>,
    resource_roots: Vec<ResourceRoot>,
    dependencies: Vec<DependencySpec>,
}

impl ModuleSpec {
    /// Start building a spec for the given identifier
    pub fn build(identifier: ModuleIdentifier) -> ModuleSpecBuilder {
        ModuleSpecBuilder {
            identifier,
            main_symbol: None,
            resource_roots: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// The module identifier
    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    /// The declared entry symbol, if any
    pub fn main_symbol(&self) -> Option<&str> {
        self.main_symbol.as_deref()
    }

    /// The resource roots in declaration order
    pub fn resource_roots(&self) -> &[ResourceRoot] {
        &self.resource_roots
    }

    /// The dependency specs in author order
    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        ModuleIdentifier,
        Option<String>,
        Vec<ResourceRoot>,
        Vec<DependencySpec>,
    ) {
        (
            self.identifier,
            self.main_symbol,
            self.resource_roots,
            self.dependencies,
        )
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("identifier", &self.identifier)
            .field("main_symbol", &self.main_symbol)
            .field("resource_roots", &self.resource_roots)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Builder for [`ModuleSpec`]
#[derive(Debug)]
pub struct ModuleSpecBuilder {
    identifier: ModuleIdentifier,
    main_symbol: Option<String>,
    resource_roots: Vec<ResourceRoot>,
    dependencies: Vec<DependencySpec>,
}

impl ModuleSpecBuilder {
    /// The identifier this spec is being built for
    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    /// Add a resource root
    pub fn add_root(&mut self, root: ResourceRoot) -> &mut Self {
        self.resource_roots.push(root);
        self
    }

    /// Append a dependency; order is semantically significant
    pub fn add_dependency(&mut self, dependency: DependencySpec) -> &mut Self {
        self.dependencies.push(dependency);
        self
    }

    /// Declare the module's entry symbol
    pub fn set_main_symbol(&mut self, name: impl Into<String>) -> &mut Self {
        self.main_symbol = Some(name.into());
        self
    }

    /// Produce the immutable spec
    pub fn create(self) -> ModuleSpec {
        ModuleSpec {
            identifier: self.identifier,
            main_symbol: self.main_symbol,
            resource_roots: self.resource_roots,
            dependencies: self.dependencies,
        }
    }
}
