//! Filesystem-backed content roots and the on-disk module repository
//!
//! Two standard backends: a directory tree and a zip archive. Both map
//! symbol `a.b.C` to the entry `a/b/C.sym` and resources to their literal
//! paths. [`FileFinder`] materializes modules from a repository layout of
//! `group-segments/artifact/slot/module.xml`.

use crate::descriptor;
use crate::error::{ModuleError, Result};
use crate::ident::ModuleIdentifier;
use crate::loader::ModuleFinder;
use crate::resource::{add_directory_chain, Resource, ResourceLoader, Symbol};
use crate::spec::ModuleSpec;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Filename extension of symbol definitions
const SYMBOL_EXTENSION: &str = ".sym";

fn symbol_file(name: &str) -> Option<String> {
    if name.is_empty() || name.contains('/') || name.split('.').any(|s| s.is_empty()) {
        return None;
    }
    Some(format!("{}{}", name.replace('.', "/"), SYMBOL_EXTENSION))
}

/// Reject paths that could escape a root
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\0')
        && path.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// A directory tree exposed as a resource root.
///
/// The directory set is scanned once at construction; content is read on
/// demand.
pub struct FileResourceLoader {
    name: String,
    root: PathBuf,
    paths: FxHashSet<String>,
}

impl FileResourceLoader {
    /// Scan `root` and expose it under the given root name
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let paths = scan_directories(&root)?;
        Ok(Self {
            name: name.into(),
            root,
            paths,
        })
    }

    fn read(&self, relative: &str) -> Option<Arc<[u8]>> {
        let full = self.root.join(relative);
        match fs::read(&full) {
            Ok(bytes) => Some(Arc::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!(path = %full.display(), error = %e, "failed to read content");
                None
            }
        }
    }
}

impl ResourceLoader for FileResourceLoader {
    fn root_name(&self) -> &str {
        &self.name
    }

    fn paths(&self) -> FxHashSet<String> {
        self.paths.clone()
    }

    fn find_symbol(&self, name: &str) -> Option<Symbol> {
        let file = symbol_file(name)?;
        self.read(&file)
            .map(|bytes| Symbol::new(name, self.name.clone(), bytes))
    }

    fn find_resource(&self, path: &str) -> Option<Resource> {
        if !is_safe_relative(path) {
            warn!(path, "rejected unsafe resource path");
            return None;
        }
        self.read(path)
            .map(|bytes| Resource::new(path, self.name.clone(), bytes))
    }
}

fn scan_directories(root: &Path) -> Result<FxHashSet<String>> {
    let mut paths = FxHashSet::default();
    paths.insert(String::new());
    let mut pending = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, relative)) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| ModuleError::Io {
            path: dir.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| ModuleError::Io {
                path: dir.clone(),
                source: e,
            })?;
            let file_type = entry.file_type().map_err(|e| ModuleError::Io {
                path: entry.path(),
                source: e,
            })?;
            if file_type.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child = if relative.is_empty() {
                    name
                } else {
                    format!("{}/{}", relative, name)
                };
                paths.insert(child.clone());
                pending.push((entry.path(), child));
            }
        }
    }
    Ok(paths)
}

/// A zip archive exposed as a resource root.
///
/// The archive is indexed into memory once at construction, so lookups
/// never reopen it.
pub struct ArchiveResourceLoader {
    name: String,
    entries: FxHashMap<String, Arc<[u8]>>,
    paths: FxHashSet<String>,
}

impl ArchiveResourceLoader {
    /// Read every entry of the archive at `path`
    pub fn open(name: impl Into<String>, path: &Path) -> Result<Self> {
        let io_error = |e: zip::result::ZipError| ModuleError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        };
        let file = fs::File::open(path).map_err(|e| ModuleError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(io_error)?;

        let mut entries = FxHashMap::default();
        let mut paths = FxHashSet::default();
        paths.insert(String::new());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(io_error)?;
            let entry_name = entry.name().trim_end_matches('/').to_string();
            if !is_safe_relative(&entry_name) {
                warn!(entry = %entry.name(), archive = %path.display(), "skipped unsafe archive entry");
                continue;
            }
            if entry.is_dir() {
                add_directory_chain(&mut paths, &entry_name);
            } else {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes).map_err(|e| ModuleError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                add_directory_chain(&mut paths, crate::resource::parent_path(&entry_name));
                entries.insert(entry_name, Arc::from(bytes));
            }
        }
        Ok(Self {
            name: name.into(),
            entries,
            paths,
        })
    }
}

impl ResourceLoader for ArchiveResourceLoader {
    fn root_name(&self) -> &str {
        &self.name
    }

    fn paths(&self) -> FxHashSet<String> {
        self.paths.clone()
    }

    fn find_symbol(&self, name: &str) -> Option<Symbol> {
        let file = symbol_file(name)?;
        self.entries
            .get(&file)
            .map(|bytes| Symbol::new(name, self.name.clone(), bytes.clone()))
    }

    fn find_resource(&self, path: &str) -> Option<Resource> {
        self.entries
            .get(path)
            .map(|bytes| Resource::new(path, self.name.clone(), bytes.clone()))
    }
}

/// A [`ModuleFinder`] over one or more on-disk module repositories.
///
/// A module `org.acme:widgets:1.0` is looked up as
/// `org/acme/widgets/1.0/module.xml` under each repository root in order;
/// the slot directory defaults to `main`.
pub struct FileFinder {
    roots: Vec<PathBuf>,
}

impl FileFinder {
    /// Create a finder over the given repository roots
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl ModuleFinder for FileFinder {
    fn find_module(&self, id: &ModuleIdentifier) -> Result<Option<ModuleSpec>> {
        let relative = module_directory(id);
        for root in &self.roots {
            let dir = root.join(&relative);
            let descriptor_path = dir.join("module.xml");
            if !descriptor_path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&descriptor_path).map_err(|e| ModuleError::Io {
                path: descriptor_path.clone(),
                source: e,
            })?;
            let spec = descriptor::parse(&dir, id, &text)?;
            return Ok(Some(spec));
        }
        Ok(None)
    }
}

fn module_directory(id: &ModuleIdentifier) -> PathBuf {
    let mut dir = PathBuf::new();
    for segment in id.group().split('.') {
        dir.push(segment);
    }
    dir.push(id.artifact());
    dir.push(id.slot().unwrap_or("main"));
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(root: &Path, relative: &str, content: &[u8]) {
        let full = root.join(relative);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    #[test]
    fn test_file_loader_scans_directories() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "org/acme/Widget.sym", b"widget");
        write_file(temp.path(), "conf/settings.txt", b"k=v");

        let loader = FileResourceLoader::new("rootOne", temp.path()).unwrap();
        let paths = loader.paths();
        for expected in ["", "org", "org/acme", "conf"] {
            assert!(paths.contains(expected), "missing {:?}", expected);
        }
    }

    #[test]
    fn test_file_loader_lookup() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "org/acme/Widget.sym", b"widget");
        write_file(temp.path(), "conf/settings.txt", b"k=v");

        let loader = FileResourceLoader::new("rootOne", temp.path()).unwrap();

        let symbol = loader.find_symbol("org.acme.Widget").unwrap();
        assert_eq!(symbol.name(), "org.acme.Widget");
        assert_eq!(symbol.bytes(), b"widget");
        assert!(loader.find_symbol("org.acme.Missing").is_none());

        let resource = loader.find_resource("conf/settings.txt").unwrap();
        assert_eq!(resource.root(), "rootOne");
        assert!(loader.find_resource("conf/missing.txt").is_none());
    }

    #[test]
    fn test_file_loader_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "inner/file.txt", b"x");

        let loader = FileResourceLoader::new("rootOne", temp.path()).unwrap();
        for path in ["../escape.txt", "/etc/passwd", "a/../b.txt", ""] {
            assert!(loader.find_resource(path).is_none(), "accepted {:?}", path);
        }
    }

    #[test]
    fn test_archive_loader() {
        let temp = TempDir::new().unwrap();
        let archive_path = temp.path().join("content.zip");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer.start_file("org/acme/Widget.sym", options).unwrap();
            writer.write_all(b"widget").unwrap();
            writer.start_file("conf/settings.txt", options).unwrap();
            writer.write_all(b"k=v").unwrap();
            writer.finish().unwrap();
        }

        let loader = ArchiveResourceLoader::open("archiveRoot", &archive_path).unwrap();
        let paths = loader.paths();
        for expected in ["", "org", "org/acme", "conf"] {
            assert!(paths.contains(expected), "missing {:?}", expected);
        }
        let symbol = loader.find_symbol("org.acme.Widget").unwrap();
        assert_eq!(symbol.bytes(), b"widget");
        assert!(loader.find_resource("conf/settings.txt").is_some());
        assert!(loader.find_resource("conf/other.txt").is_none());
    }

    #[test]
    fn test_module_directory_layout() {
        let id: ModuleIdentifier = "org.acme:widgets:1.0".parse().unwrap();
        assert_eq!(
            module_directory(&id),
            PathBuf::from("org/acme/widgets/1.0")
        );
        let no_slot: ModuleIdentifier = "org.acme:widgets".parse().unwrap();
        assert_eq!(
            module_directory(&no_slot),
            PathBuf::from("org/acme/widgets/main")
        );
    }
}
