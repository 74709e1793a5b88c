use pretty_assertions::assert_eq;
use stache::tpl::{
    ArrayLoader, Cache, CascadingLoader, FilesystemCache, FilesystemLoader, InlineLoader,
    MemoryCache, ProductionFilesystemLoader,
};
use stache::{Engine, EngineOptions, map};
use std::fs;
use std::sync::Arc;

#[test]
fn test_filesystem_loader_with_partials() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.mustache"), "Hello, {{> name }}!").unwrap();
    fs::write(dir.path().join("name.mustache"), "{{ name }}").unwrap();

    let engine = Engine::new(
        EngineOptions::new().loader(FilesystemLoader::new(dir.path()).unwrap()),
    )
    .unwrap();
    assert_eq!(
        engine.render_value("hello", map! { "name" => "Sue" }).unwrap(),
        "Hello, Sue!"
    );

    let err = engine.render("missing", &()).err().unwrap();
    assert_eq!(err.template_name(), Some("missing"));
}

#[test]
fn test_separate_partials_loader() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("item.mustache"), "<{{ . }}>").unwrap();

    let engine = Engine::new(
        EngineOptions::new().partials_loader(FilesystemLoader::new(dir.path()).unwrap()),
    )
    .unwrap();
    assert_eq!(
        engine
            .render_value("{{# items }}{{> item }}{{/ items }}", map! { "items" => vec!["a", "b"] })
            .unwrap(),
        "<a><b>"
    );

    // a filesystem loader cannot take partials at runtime
    let mut engine = engine;
    assert!(engine.set_partials(Default::default()).is_err());
}

#[test]
fn test_cascading_and_inline_loaders() {
    let inline = InlineLoader::new("@@ greeting\nHi {{ who }}\n@@ who\nthere\n");
    let loader = CascadingLoader::new()
        .with_loader(ArrayLoader::with_templates([("main", "{{> greeting }}.")]))
        .with_loader(inline);
    let engine = Engine::new(EngineOptions::new().loader(loader)).unwrap();

    assert_eq!(
        engine.render_value("main", map! { "who" => "you" }).unwrap(),
        "Hi you."
    );
}

#[test]
fn test_production_loader_recompiles_changed_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.mustache");
    fs::write(&path, "v1 {{ a }}").unwrap();

    let cache = Arc::new(MemoryCache::new());
    let engine = Engine::new(
        EngineOptions::new()
            .loader(ProductionFilesystemLoader::new(dir.path()).unwrap())
            .shared_cache(cache.clone()),
    )
    .unwrap();
    assert_eq!(engine.render_value("page", map! { "a" => 1 }).unwrap(), "v1 1");
    assert_eq!(cache.len(), 1);

    // a fresh loader sees the new size, so the template gets a new key
    fs::write(&path, "version 2 {{ a }}").unwrap();
    let engine = Engine::new(
        EngineOptions::new()
            .loader(ProductionFilesystemLoader::new(dir.path()).unwrap())
            .shared_cache(cache.clone()),
    )
    .unwrap();
    assert_eq!(
        engine.render_value("page", map! { "a" => 1 }).unwrap(),
        "version 2 1"
    );
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_filesystem_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");

    let engine = Engine::new(EngineOptions::new().cache(FilesystemCache::new(&cache_dir))).unwrap();
    let name = engine.load_template("{{# a }}[{{ . }}]{{/ a }}").unwrap().name().to_string();

    let cache = FilesystemCache::new(&cache_dir);
    let stored = cache.load(&name).unwrap().unwrap();
    assert!(stored.contains("\"op\":\"section\""));

    // a new engine activates the stored program instead of compiling
    let engine = Engine::new(EngineOptions::new().cache(FilesystemCache::new(&cache_dir))).unwrap();
    assert_eq!(
        engine
            .render_value("{{# a }}[{{ . }}]{{/ a }}", map! { "a" => vec![1, 2] })
            .unwrap(),
        "[1][2]"
    );
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);
}
