//! Content types and loader contracts
//!
//! A [`ResourceLoader`] is one backend root (a directory tree, an archive, an
//! in-memory table) exposing symbols and resources under slash-separated
//! paths. A [`LocalLoader`] presents one unit of local content, usually the
//! union of several roots, and is what dependency edges ultimately delegate
//! to.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// A loadable named definition, such as a compiled class
#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    root: String,
    bytes: Arc<[u8]>,
}

impl Symbol {
    /// Create a symbol with its canonical dotted name and defining root
    pub fn new(name: impl Into<String>, root: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            bytes: bytes.into(),
        }
    }

    /// Canonical dotted name, e.g. `org.acme.Widget`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the root that provided this symbol
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The definition bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A piece of content addressed by full path
#[derive(Debug, Clone)]
pub struct Resource {
    path: String,
    root: String,
    bytes: Arc<[u8]>,
}

impl Resource {
    /// Create a resource with its full path and providing root
    pub fn new(path: impl Into<String>, root: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
            bytes: bytes.into(),
        }
    }

    /// Full slash-separated path, e.g. `conf/settings.txt`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the root that provided this resource
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The content bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Content length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the content is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One backend root of module content.
///
/// Implementations must be pure with respect to their construction
/// arguments: the same lookup yields the same answer across calls, absent an
/// explicit refresh.
pub trait ResourceLoader: Send + Sync {
    /// Name of this root, recorded as provenance on loaded content
    fn root_name(&self) -> &str;

    /// The directory paths this root answers for, including `""` for the
    /// top level. Used at link time to precompute which paths a module owns.
    fn paths(&self) -> FxHashSet<String>;

    /// Look up a symbol by canonical dotted name. May block on I/O.
    fn find_symbol(&self, name: &str) -> Option<Symbol>;

    /// Open the resource at a full path. May block on I/O.
    fn find_resource(&self, path: &str) -> Option<Resource>;
}

/// One unit of local content: symbol and resource queries over a module's
/// own roots, without any dependency traversal.
pub trait LocalLoader: Send + Sync {
    /// Union of the backing roots' path sets
    fn paths(&self) -> Arc<FxHashSet<String>>;

    /// Look up a symbol in local content only
    fn load_symbol_local(&self, name: &str) -> Option<Symbol>;

    /// Open the first local resource at the path
    fn load_resource_local(&self, path: &str) -> Option<Resource>;

    /// Enumerate every local resource at the path, in root order
    fn load_resources_local(&self, path: &str) -> Vec<Resource>;
}

/// A [`LocalLoader`] over an ordered list of resource roots
pub struct SimpleLocalLoader {
    loaders: Vec<Arc<dyn ResourceLoader>>,
    paths: Arc<FxHashSet<String>>,
}

impl SimpleLocalLoader {
    /// Wrap the given roots; their order decides lookup precedence
    pub fn new(loaders: Vec<Arc<dyn ResourceLoader>>) -> Self {
        let mut paths = FxHashSet::default();
        for loader in &loaders {
            paths.extend(loader.paths());
        }
        Self {
            loaders,
            paths: Arc::new(paths),
        }
    }
}

impl LocalLoader for SimpleLocalLoader {
    fn paths(&self) -> Arc<FxHashSet<String>> {
        self.paths.clone()
    }

    fn load_symbol_local(&self, name: &str) -> Option<Symbol> {
        self.loaders.iter().find_map(|l| l.find_symbol(name))
    }

    fn load_resource_local(&self, path: &str) -> Option<Resource> {
        self.loaders.iter().find_map(|l| l.find_resource(path))
    }

    fn load_resources_local(&self, path: &str) -> Vec<Resource> {
        self.loaders
            .iter()
            .filter_map(|l| l.find_resource(path))
            .collect()
    }
}

/// An in-memory resource root, built up front from explicit entries.
///
/// Useful for embedding synthetic modules and for tests that do not need a
/// filesystem.
pub struct MemoryResourceLoader {
    name: String,
    symbols: FxHashMap<String, Arc<[u8]>>,
    resources: FxHashMap<String, Arc<[u8]>>,
    paths: FxHashSet<String>,
}

impl MemoryResourceLoader {
    /// Start building a root with the given name
    pub fn build(name: impl Into<String>) -> MemoryResourceLoaderBuilder {
        MemoryResourceLoaderBuilder {
            name: name.into(),
            symbols: Vec::new(),
            resources: Vec::new(),
        }
    }
}

/// Builder for [`MemoryResourceLoader`]
pub struct MemoryResourceLoaderBuilder {
    name: String,
    symbols: Vec<(String, Vec<u8>)>,
    resources: Vec<(String, Vec<u8>)>,
}

impl MemoryResourceLoaderBuilder {
    /// Add a symbol definition under its canonical dotted name
    pub fn symbol(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.symbols.push((name.into(), bytes.into()));
        self
    }

    /// Add a resource under its full path
    pub fn resource(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.resources.push((path.into(), bytes.into()));
        self
    }

    /// Finish the root, computing its path set
    pub fn create(self) -> MemoryResourceLoader {
        let mut paths = FxHashSet::default();
        paths.insert(String::new());
        let mut symbols = FxHashMap::default();
        for (name, bytes) in self.symbols {
            add_directory_chain(&mut paths, &symbol_path(&name));
            symbols.insert(name, Arc::from(bytes));
        }
        let mut resources = FxHashMap::default();
        for (path, bytes) in self.resources {
            add_directory_chain(&mut paths, parent_path(&path));
            resources.insert(path, Arc::from(bytes));
        }
        MemoryResourceLoader {
            name: self.name,
            symbols,
            resources,
            paths,
        }
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn root_name(&self) -> &str {
        &self.name
    }

    fn paths(&self) -> FxHashSet<String> {
        self.paths.clone()
    }

    fn find_symbol(&self, name: &str) -> Option<Symbol> {
        self.symbols
            .get(name)
            .map(|bytes| Symbol::new(name, self.name.clone(), bytes.clone()))
    }

    fn find_resource(&self, path: &str) -> Option<Resource> {
        self.resources
            .get(path)
            .map(|bytes| Resource::new(path, self.name.clone(), bytes.clone()))
    }
}

/// The path token a symbol name is filtered on: `a.b.c.Foo` lives in `a/b/c`
pub(crate) fn symbol_path(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((package, _)) => package.replace('.', "/"),
        None => String::new(),
    }
}

/// The path token a resource is filtered on: its containing directory
pub(crate) fn parent_path(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}

/// Insert `dir` and every ancestor directory (including `""`) into the set
pub(crate) fn add_directory_chain(paths: &mut FxHashSet<String>, dir: &str) {
    paths.insert(String::new());
    if dir.is_empty() {
        return;
    }
    let mut end = dir.len();
    loop {
        paths.insert(dir[..end].to_string());
        match dir[..end].rfind('/') {
            Some(slash) => end = slash,
            None => break,
        }
    }
}
