//! End-to-end tests for module loading, filtering, and resolution

use modlink::{
    DependencySpec, FileFinder, MemoryResourceLoader, ModuleIdentifier, ModuleLoader, ModuleSpec,
    MultiplePathFilterBuilder, ResourceRoot, StaticFinder,
};
use std::sync::Arc;

fn memory_root(
    name: &str,
    symbols: &[&str],
    resources: &[(&str, &str)],
) -> Arc<MemoryResourceLoader> {
    let mut builder = MemoryResourceLoader::build(name);
    for symbol in symbols {
        builder = builder.symbol(*symbol, format!("def:{}", symbol).into_bytes());
    }
    for (path, content) in resources {
        builder = builder.resource(*path, content.as_bytes().to_vec());
    }
    Arc::new(builder.create())
}

fn id(text: &str) -> ModuleIdentifier {
    text.parse().unwrap()
}

/// Module graph mirroring the classic visibility scenarios:
/// - `test:app` has its own content and imports `test:lib` without re-export
/// - `test:reexporter` re-exports `test:lib` wholesale
/// - `test:filtered-export` re-exports `test:lib` minus `org/acme/**` and `nested`
/// - `test:filtered-import` imports `test:lib` minus `org/acme/**` and `nested`
/// - `test:consumer` imports `test:app`; `test:consumer-b` imports `test:reexporter`
fn build_loader() -> Arc<ModuleLoader> {
    let finder = StaticFinder::new();

    let mut app = ModuleSpec::build(id("test:app"));
    app.add_root(ResourceRoot::new(
        "rootOne",
        memory_root(
            "rootOne",
            &["org.acme.shared.AppClass"],
            &[("app.txt", "app"), ("nested/nested.txt", "app nested")],
        ),
    ));
    app.add_dependency(DependencySpec::local());
    app.add_dependency(DependencySpec::on_module(id("test:lib")));
    finder.add_spec(app.create());

    let mut lib = ModuleSpec::build(id("test:lib"));
    lib.add_root(ResourceRoot::new(
        "rootTwo",
        memory_root(
            "rootTwo",
            &["org.acme.shared.LibClass"],
            &[("lib.txt", "lib"), ("nested/nested.txt", "lib nested")],
        ),
    ));
    lib.add_dependency(DependencySpec::local());
    finder.add_spec(lib.create());

    let mut reexporter = ModuleSpec::build(id("test:reexporter"));
    reexporter.add_dependency(DependencySpec::module_dependency(id("test:lib")).export(true).build());
    finder.add_spec(reexporter.create());

    let mut filtered_export = ModuleSpec::build(id("test:filtered-export"));
    let mut export_filter = MultiplePathFilterBuilder::new(true);
    export_filter.exclude("org/acme/**");
    export_filter.exclude("nested");
    filtered_export.add_dependency(
        DependencySpec::module_dependency(id("test:lib"))
            .export(true)
            .export_filter(export_filter.build())
            .build(),
    );
    finder.add_spec(filtered_export.create());

    let mut filtered_import = ModuleSpec::build(id("test:filtered-import"));
    let mut import_filter = MultiplePathFilterBuilder::new(true);
    import_filter.exclude("org/acme/**");
    import_filter.exclude("nested");
    filtered_import.add_dependency(
        DependencySpec::module_dependency(id("test:lib"))
            .import_filter(import_filter.build())
            .build(),
    );
    finder.add_spec(filtered_import.create());

    let mut consumer = ModuleSpec::build(id("test:consumer"));
    consumer.add_dependency(DependencySpec::on_module(id("test:app")));
    finder.add_spec(consumer.create());

    let mut consumer_b = ModuleSpec::build(id("test:consumer-b"));
    consumer_b.add_dependency(DependencySpec::on_module(id("test:reexporter")));
    finder.add_spec(consumer_b.create());

    ModuleLoader::new(Box::new(finder))
}

#[test]
fn test_local_symbol_load() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:app")).unwrap();

    let symbol = module.namespace().load_symbol("org.acme.shared.AppClass").unwrap();
    assert_eq!(symbol.root(), "rootOne");
    assert!(module.namespace().load_symbol("org.acme.shared.Bogus").is_none());
}

#[test]
fn test_import_symbol_load() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:app")).unwrap();

    let symbol = module.namespace().load_symbol("org.acme.shared.LibClass").unwrap();
    assert_eq!(symbol.root(), "rootTwo");
}

#[test]
fn test_import_without_reexport_is_private() {
    let loader = build_loader();
    let app = loader.load_module(&id("test:app")).unwrap();
    // The import works for the module itself but is invisible to consumers.
    assert!(app.namespace().load_symbol("org.acme.shared.LibClass").is_some());
    assert!(app
        .namespace()
        .load_exported_symbol("org.acme.shared.LibClass")
        .is_none());

    let consumer = loader.load_module(&id("test:consumer")).unwrap();
    assert!(consumer
        .namespace()
        .load_symbol("org.acme.shared.LibClass")
        .is_none());
    // The module's own content is re-exported as usual.
    assert!(consumer
        .namespace()
        .load_symbol("org.acme.shared.AppClass")
        .is_some());
}

#[test]
fn test_reexport_is_transitive() {
    let loader = build_loader();
    let reexporter = loader.load_module(&id("test:reexporter")).unwrap();
    assert!(reexporter
        .namespace()
        .load_exported_symbol("org.acme.shared.LibClass")
        .is_some());

    let consumer = loader.load_module(&id("test:consumer-b")).unwrap();
    assert!(consumer
        .namespace()
        .load_symbol("org.acme.shared.LibClass")
        .is_some());
}

#[test]
fn test_filtered_export() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:filtered-export")).unwrap();

    // Imports are unaffected by the export filter.
    assert!(module.namespace().load_symbol("org.acme.shared.LibClass").is_some());
    assert!(module.namespace().resource("nested/nested.txt").is_some());

    // Exports drop the excluded paths.
    assert!(module
        .namespace()
        .load_exported_symbol("org.acme.shared.LibClass")
        .is_none());
    assert!(module.namespace().exported_resource("nested/nested.txt").is_none());
    // Unfiltered paths still flow through.
    assert!(module.namespace().exported_resource("lib.txt").is_some());
}

#[test]
fn test_filtered_import() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:filtered-import")).unwrap();

    assert!(module.namespace().load_symbol("org.acme.shared.LibClass").is_none());
    assert!(module.namespace().resource("nested/nested.txt").is_none());
    assert!(module.namespace().resource("lib.txt").is_some());

    // The target module itself is unaffected.
    let lib = loader.load_module(&id("test:lib")).unwrap();
    assert!(lib.namespace().resource("nested/nested.txt").is_some());
}

#[test]
fn test_local_resource_retrieval() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:app")).unwrap();

    let resource = module.namespace().resource("app.txt").unwrap();
    assert_eq!(resource.root(), "rootOne");
    assert_eq!(resource.bytes(), b"app");
    assert!(module.namespace().resource("bogus.txt").is_none());
}

#[test]
fn test_import_resource_retrieval() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:app")).unwrap();

    let resource = module.namespace().resource("lib.txt").unwrap();
    assert_eq!(resource.root(), "rootTwo");
}

#[test]
fn test_exported_resource_retrieval() {
    let loader = build_loader();
    let app = loader.load_module(&id("test:app")).unwrap();
    assert!(app.namespace().exported_resource("lib.txt").is_none());

    let reexporter = loader.load_module(&id("test:reexporter")).unwrap();
    let resource = reexporter.namespace().exported_resource("lib.txt").unwrap();
    assert_eq!(resource.root(), "rootTwo");
}

#[test]
fn test_resources_enumeration() {
    let loader = build_loader();
    let module = loader.load_module(&id("test:app")).unwrap();

    // Both the local root and the imported module provide nested/nested.txt,
    // in traversal order.
    let hits = module.namespace().resources("nested/nested.txt");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].root(), "rootOne");
    assert_eq!(hits[1].root(), "rootTwo");

    assert_eq!(module.namespace().resources("app.txt").len(), 1);
    assert!(module.namespace().resources("bogus.txt").is_empty());
}

#[test]
fn test_exported_resources_enumeration() {
    let loader = build_loader();
    let app = loader.load_module(&id("test:app")).unwrap();
    assert!(app.namespace().exported_resources("lib.txt").is_empty());

    let reexporter = loader.load_module(&id("test:reexporter")).unwrap();
    let hits = reexporter.namespace().exported_resources("lib.txt");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].root(), "rootTwo");
}

/// Cycle graph: a -> b -> c -> a plus c -> d -> a, all re-exporting
fn build_cyclic_loader() -> Arc<ModuleLoader> {
    let finder = StaticFinder::new();

    let mut a = ModuleSpec::build(id("cycle:a"));
    a.add_root(ResourceRoot::new(
        "rootA",
        memory_root("rootA", &["org.acme.shared.AlphaClass"], &[("data/x.txt", "from a")]),
    ));
    a.add_dependency(DependencySpec::local());
    a.add_dependency(DependencySpec::module_dependency(id("cycle:b")).export(true).build());
    finder.add_spec(a.create());

    let mut b = ModuleSpec::build(id("cycle:b"));
    b.add_root(ResourceRoot::new(
        "rootB",
        memory_root("rootB", &["org.acme.shared.BetaClass"], &[("data/x.txt", "from b")]),
    ));
    b.add_dependency(DependencySpec::local());
    b.add_dependency(DependencySpec::module_dependency(id("cycle:c")).export(true).build());
    finder.add_spec(b.create());

    let mut c = ModuleSpec::build(id("cycle:c"));
    c.add_dependency(DependencySpec::module_dependency(id("cycle:d")).export(true).build());
    c.add_dependency(DependencySpec::module_dependency(id("cycle:a")).export(true).build());
    finder.add_spec(c.create());

    let mut d = ModuleSpec::build(id("cycle:d"));
    d.add_dependency(DependencySpec::module_dependency(id("cycle:a")).export(true).build());
    finder.add_spec(d.create());

    ModuleLoader::new(Box::new(finder))
}

#[test]
fn test_cyclic_symbol_load() {
    let loader = build_cyclic_loader();

    let a = loader.load_module(&id("cycle:a")).unwrap();
    assert!(a
        .namespace()
        .load_exported_symbol("org.acme.shared.BetaClass")
        .is_some());

    let b = loader.load_module(&id("cycle:b")).unwrap();
    assert!(b
        .namespace()
        .load_exported_symbol("org.acme.shared.AlphaClass")
        .is_some());

    let c = loader.load_module(&id("cycle:c")).unwrap();
    assert!(c
        .namespace()
        .load_exported_symbol("org.acme.shared.AlphaClass")
        .is_some());
    assert!(c
        .namespace()
        .load_exported_symbol("org.acme.shared.BetaClass")
        .is_some());

    let d = loader.load_module(&id("cycle:d")).unwrap();
    assert!(d
        .namespace()
        .load_exported_symbol("org.acme.shared.AlphaClass")
        .is_some());
    assert!(d
        .namespace()
        .load_exported_symbol("org.acme.shared.BetaClass")
        .is_some());
}

#[test]
fn test_cyclic_enumeration_deduplicates_providers() {
    let loader = build_cyclic_loader();
    for module_id in ["cycle:a", "cycle:b", "cycle:c", "cycle:d"] {
        let module = loader.load_module(&id(module_id)).unwrap();
        let hits = module.namespace().resources("data/x.txt");
        // One hit per distinct provider, however many paths reach it.
        assert_eq!(hits.len(), 2, "wrong hit count from {}", module_id);
        let mut roots: Vec<&str> = hits.iter().map(|r| r.root()).collect();
        roots.sort_unstable();
        assert_eq!(roots, ["rootA", "rootB"]);
    }
}

#[test]
fn test_optional_dependency_is_silent() {
    let finder = StaticFinder::new();
    let mut optional = ModuleSpec::build(id("test:tolerant"));
    optional.add_root(ResourceRoot::new(
        "rootOne",
        memory_root("rootOne", &["org.acme.Own"], &[]),
    ));
    optional.add_dependency(DependencySpec::local());
    optional.add_dependency(
        DependencySpec::module_dependency(id("test:absent"))
            .export(true)
            .optional(true)
            .build(),
    );
    finder.add_spec(optional.create());

    let mut mandatory = ModuleSpec::build(id("test:strict"));
    mandatory.add_dependency(
        DependencySpec::module_dependency(id("test:absent")).export(true).build(),
    );
    finder.add_spec(mandatory.create());

    let loader = ModuleLoader::new(Box::new(finder));

    // Optional and missing: the module links, the edge matches nothing, and
    // every other query is unaffected.
    let tolerant = loader.load_module(&id("test:tolerant")).unwrap();
    assert!(tolerant.namespace().load_symbol("org.acme.Own").is_some());
    assert!(tolerant.namespace().load_symbol("org.acme.Elsewhere").is_none());

    // Mandatory and missing: linking fails.
    let result = loader.load_module(&id("test:strict"));
    assert!(matches!(result, Err(modlink::ModuleError::ModuleNotFound { .. })));
}

#[test]
fn test_first_matching_dependency_wins() {
    let finder = StaticFinder::new();
    for (module_id, root) in [("dup:one", "rootOne"), ("dup:two", "rootTwo")] {
        let mut spec = ModuleSpec::build(id(module_id));
        spec.add_root(ResourceRoot::new(
            root,
            memory_root(root, &["org.dup.Thing"], &[]),
        ));
        spec.add_dependency(DependencySpec::local());
        finder.add_spec(spec.create());
    }

    let mut plain = ModuleSpec::build(id("dup:consumer"));
    plain.add_dependency(DependencySpec::on_module(id("dup:one")));
    plain.add_dependency(DependencySpec::on_module(id("dup:two")));
    finder.add_spec(plain.create());

    // Same order, but the first edge's import filter rejects the path.
    let mut filtered = ModuleSpec::build(id("dup:filtered-consumer"));
    let mut reject_dup = MultiplePathFilterBuilder::new(true);
    reject_dup.exclude("org/dup");
    filtered.add_dependency(
        DependencySpec::module_dependency(id("dup:one"))
            .import_filter(reject_dup.build())
            .build(),
    );
    filtered.add_dependency(DependencySpec::on_module(id("dup:two")));
    finder.add_spec(filtered.create());

    let loader = ModuleLoader::new(Box::new(finder));

    let plain = loader.load_module(&id("dup:consumer")).unwrap();
    assert_eq!(
        plain.namespace().load_symbol("org.dup.Thing").unwrap().root(),
        "rootOne"
    );

    let filtered = loader.load_module(&id("dup:filtered-consumer")).unwrap();
    assert_eq!(
        filtered.namespace().load_symbol("org.dup.Thing").unwrap().root(),
        "rootTwo"
    );
}

#[test]
fn test_relink_propagates_to_dependents_only_on_request() {
    let finder = StaticFinder::new();

    let mut lib = ModuleSpec::build(id("adm:lib"));
    lib.add_root(ResourceRoot::new(
        "rootTwo",
        memory_root("rootTwo", &["org.acme.shared.LibClass"], &[]),
    ));
    lib.add_dependency(DependencySpec::local());
    finder.add_spec(lib.create());

    // Initially imports the library without re-exporting it.
    let mut middle = ModuleSpec::build(id("adm:middle"));
    middle.add_dependency(DependencySpec::on_module(id("adm:lib")));
    finder.add_spec(middle.create());

    let mut consumer = ModuleSpec::build(id("adm:consumer"));
    consumer.add_dependency(
        DependencySpec::module_dependency(id("adm:middle")).export(true).build(),
    );
    finder.add_spec(consumer.create());

    let loader = ModuleLoader::new(Box::new(finder));
    let middle_module = loader.load_module(&id("adm:middle")).unwrap();
    let consumer_module = loader.load_module(&id("adm:consumer")).unwrap();

    assert!(consumer_module
        .namespace()
        .load_exported_symbol("org.acme.shared.LibClass")
        .is_none());

    // Turn the middle edge into a re-export and relink the middle module.
    loader
        .set_and_relink_dependencies(
            &middle_module,
            vec![DependencySpec::module_dependency(id("adm:lib")).export(true).build()],
        )
        .unwrap();

    // Global queries see the new edge immediately.
    assert!(consumer_module
        .namespace()
        .load_symbol("org.acme.shared.LibClass")
        .is_some());
    // The consumer's own re-export table is stale until it is relinked.
    assert!(consumer_module
        .namespace()
        .load_exported_symbol("org.acme.shared.LibClass")
        .is_none());
    loader.relink(&consumer_module).unwrap();
    assert!(consumer_module
        .namespace()
        .load_exported_symbol("org.acme.shared.LibClass")
        .is_some());
}

#[test]
fn test_replace_resource_loaders() {
    let finder = StaticFinder::new();
    let mut spec = ModuleSpec::build(id("adm:swap"));
    spec.add_root(ResourceRoot::new(
        "rootOne",
        memory_root("rootOne", &[], &[("old.txt", "old")]),
    ));
    spec.add_dependency(DependencySpec::local());
    finder.add_spec(spec.create());

    let loader = ModuleLoader::new(Box::new(finder));
    let module = loader.load_module(&id("adm:swap")).unwrap();
    assert!(module.namespace().resource("old.txt").is_some());

    loader
        .set_and_refresh_resource_loaders(
            &module,
            vec![ResourceRoot::new(
                "rootNew",
                memory_root("rootNew", &[], &[("new/replacement.txt", "new")]),
            )],
        )
        .unwrap();

    assert!(module.namespace().resource("old.txt").is_none());
    let replacement = module.namespace().resource("new/replacement.txt").unwrap();
    assert_eq!(replacement.root(), "rootNew");
    assert!(module.local_paths().contains("new"));
}

#[test]
fn test_external_local_loader_dependency() {
    use modlink::{LocalLoader, SimpleLocalLoader};

    let external_root = memory_root(
        "external",
        &["org.ext.Extension"],
        &[("ext/data.txt", "external data")],
    ) as Arc<dyn modlink::ResourceLoader>;
    let external = Arc::new(SimpleLocalLoader::new(vec![external_root]));
    let external_paths = (*external.paths()).clone();

    let finder = StaticFinder::new();
    let mut spec = ModuleSpec::build(id("test:host"));
    spec.add_dependency(DependencySpec::on_local_loader(
        external.clone(),
        external_paths,
    ));
    finder.add_spec(spec.create());

    let loader = ModuleLoader::new(Box::new(finder));
    let module = loader.load_module(&id("test:host")).unwrap();

    let symbol = module.namespace().load_symbol("org.ext.Extension").unwrap();
    assert_eq!(symbol.root(), "external");
    assert!(module.namespace().resource("ext/data.txt").is_some());
    // External local loaders are not exported by default.
    assert!(module
        .namespace()
        .load_exported_symbol("org.ext.Extension")
        .is_none());
}

#[test]
fn test_filesystem_repository_end_to_end() {
    let temp = tempfile::TempDir::new().unwrap();
    let repo = temp.path();

    let app_dir = repo.join("test/app/main");
    std::fs::create_dir_all(app_dir.join("content/org/acme")).unwrap();
    std::fs::write(app_dir.join("content/org/acme/App.sym"), b"app").unwrap();
    std::fs::write(
        app_dir.join("module.xml"),
        r#"<module xmlns="urn:jboss:module:1.0" name="test:app">
            <dependencies>
                <module name="test:lib" export="true"/>
            </dependencies>
            <resources>
                <resource-root path="content"/>
            </resources>
            <main-class name="org.acme.App"/>
        </module>"#,
    )
    .unwrap();

    let lib_dir = repo.join("test/lib/main");
    std::fs::create_dir_all(lib_dir.join("content/org/acme/util")).unwrap();
    std::fs::write(lib_dir.join("content/org/acme/util/Helper.sym"), b"helper").unwrap();
    std::fs::write(lib_dir.join("content/help.txt"), b"help me").unwrap();
    std::fs::write(
        lib_dir.join("module.xml"),
        r#"<module xmlns="urn:jboss:module:1.0" name="test:lib">
            <resources>
                <resource-root path="content"/>
            </resources>
        </module>"#,
    )
    .unwrap();

    let loader = ModuleLoader::new(Box::new(FileFinder::new(vec![repo.to_path_buf()])));
    let app = loader.load_module(&id("test:app")).unwrap();

    assert_eq!(app.main_symbol(), Some("org.acme.App"));
    assert!(app.namespace().load_symbol("org.acme.App").is_some());
    // Resolved through the re-exporting dependency edge.
    assert!(app.namespace().load_symbol("org.acme.util.Helper").is_some());
    let help = app.namespace().resource("help.txt").unwrap();
    assert_eq!(help.bytes(), b"help me");
    // The app re-exports the library, so consumers of the app would see it.
    assert!(app
        .namespace()
        .load_exported_symbol("org.acme.util.Helper")
        .is_some());
}
