//! End-to-end refresh scenarios over a synthesized classpath.

mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use symdex::ModuleConfig;
use symdex::NopResolver;
use symdex::SearchService;
use symdex::SymdexConfig;
use tempfile::TempDir;

use common::bump_clock;
use common::public_class;
use common::write_class;
use common::write_jar;

struct Fixture {
    _dir: TempDir,
    classes: std::path::PathBuf,
    service: SearchService,
}

/// One module with two loose public classes plus one dependency jar.
fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let classes = dir.path().join("target/classes");

    write_class(
        &classes,
        "org/ensime/indexer/SearchService",
        &public_class("org/ensime/indexer/SearchService"),
    );
    write_class(
        &classes,
        "org/ensime/core/RichPresentationCompiler",
        &public_class("org/ensime/core/RichPresentationCompiler"),
    );
    write_jar(
        &dir.path().join("deps/scalatest.jar"),
        &[
            (
                "org/scalatest/FunSpec.class",
                public_class("org/scalatest/FunSpec"),
            ),
            ("sun/misc/Hidden.class", public_class("sun/misc/Hidden")),
        ],
    );

    let service = service_for(dir.path(), &classes);
    Fixture {
        classes,
        _dir: dir,
        service,
    }
}

fn service_for(root: &Path, classes: &Path) -> SearchService {
    let mut modules = BTreeMap::new();
    modules.insert(
        "main".to_string(),
        ModuleConfig {
            target_dirs: vec![classes.to_path_buf()],
            compile_jars: vec![root.join("deps/scalatest.jar")],
            ..Default::default()
        },
    );
    let config = SymdexConfig {
        cache_dir: root.join("cache"),
        modules,
        java_lib: None,
        ..Default::default()
    };
    SearchService::new(config, Arc::new(NopResolver)).unwrap()
}

#[tokio::test]
async fn pristine_index_then_idempotent_refresh() {
    let fixture = setup();

    // S1: empty cache dir, everything is fresh.
    let (deleted, indexed) = fixture.service.refresh().await.unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(indexed, 3); // two loose class files + the jar

    // The blacklisted jar entry never becomes searchable.
    let hits = fixture.service.search_classes("Hidden", 10).await.unwrap();
    assert!(hits.is_empty());

    // S2: nothing changed on disk.
    let (deleted, indexed) = fixture.service.refresh().await.unwrap();
    assert_eq!((deleted, indexed), (0, 0));
}

#[tokio::test]
async fn mass_timestamp_bump_reindexes_everything() {
    let fixture = setup();
    fixture.service.refresh().await.unwrap();

    // S3: touch every file under the target directory.
    bump_clock();
    for internal in [
        "org/ensime/indexer/SearchService",
        "org/ensime/core/RichPresentationCompiler",
    ] {
        write_class(&fixture.classes, internal, &public_class(internal));
    }

    let (deleted, indexed) = fixture.service.refresh().await.unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(indexed, 2);

    // Symbols survive the churn.
    let found = fixture
        .service
        .find_unique("org.ensime.indexer.SearchService")
        .await
        .unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn targeted_delete_removes_exactly_one() {
    let fixture = setup();
    fixture.service.refresh().await.unwrap();

    // S4: one known class file vanishes.
    std::fs::remove_file(
        fixture
            .classes
            .join("org/ensime/indexer/SearchService.class"),
    )
    .unwrap();

    let (deleted, indexed) = fixture.service.refresh().await.unwrap();
    assert_eq!((deleted, indexed), (1, 0));

    assert!(fixture
        .service
        .find_unique("org.ensime.indexer.SearchService")
        .await
        .unwrap()
        .is_none());
    let hits = fixture
        .service
        .search_classes("SearchService", 10)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn dropping_a_jar_from_config_marks_it_stale() {
    let dir = TempDir::new().unwrap();
    let classes = dir.path().join("target/classes");
    write_class(&classes, "a/Keep", &public_class("a/Keep"));
    write_jar(
        &dir.path().join("deps/scalatest.jar"),
        &[("org/scalatest/FunSpec.class", public_class("org/scalatest/FunSpec"))],
    );

    let service = service_for(dir.path(), &classes);
    let (_, indexed) = service.refresh().await.unwrap();
    assert_eq!(indexed, 2);
    drop(service);

    // Same cache dir, jar no longer configured.
    let mut modules = BTreeMap::new();
    modules.insert(
        "main".to_string(),
        ModuleConfig {
            target_dirs: vec![classes.clone()],
            ..Default::default()
        },
    );
    let config = SymdexConfig {
        cache_dir: dir.path().join("cache"),
        modules,
        java_lib: None,
        ..Default::default()
    };
    let service = SearchService::new(config, Arc::new(NopResolver)).unwrap();

    let (deleted, indexed) = service.refresh().await.unwrap();
    assert_eq!((deleted, indexed), (1, 0));
    assert!(service
        .find_unique("org.scalatest.FunSpec")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn change_listener_keeps_both_stores_in_sync() {
    let fixture = setup();
    fixture.service.refresh().await.unwrap();

    // A brand-new class appears.
    let path = write_class(
        &fixture.classes,
        "org/ensime/util/NewThing",
        &public_class("org/ensime/util/NewThing"),
    );
    fixture.service.on_classfile_added(&path).await.unwrap();
    let hits = fixture.service.search_classes("NewThing", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].fqn, "org.ensime.util.NewThing");

    // It changes in place.
    bump_clock();
    write_class(
        &fixture.classes,
        "org/ensime/util/NewThing",
        &public_class("org/ensime/util/NewThing"),
    );
    fixture.service.on_classfile_changed(&path).await.unwrap();
    assert!(fixture
        .service
        .find_unique("org.ensime.util.NewThing")
        .await
        .unwrap()
        .is_some());

    // It vanishes.
    std::fs::remove_file(&path).unwrap();
    fixture.service.on_classfile_removed(&path).await.unwrap();
    assert!(fixture
        .service
        .find_unique("org.ensime.util.NewThing")
        .await
        .unwrap()
        .is_none());
    assert!(fixture
        .service
        .search_classes("NewThing", 10)
        .await
        .unwrap()
        .is_empty());

    // The next refresh has nothing left to reconcile.
    let (deleted, indexed) = fixture.service.refresh().await.unwrap();
    assert_eq!((deleted, indexed), (0, 0));
}

#[tokio::test]
async fn malformed_class_files_do_not_abort_refresh() {
    let dir = TempDir::new().unwrap();
    let classes = dir.path().join("target/classes");
    write_class(&classes, "a/Good", &public_class("a/Good"));
    write_class(&classes, "a/Bad", b"not a class file");

    let service = service_for(dir.path(), &classes);
    let (deleted, indexed) = service.refresh().await.unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(indexed, 2);

    assert!(service.find_unique("a.Good").await.unwrap().is_some());
    // The malformed file is fingerprinted with no symbols and not retried.
    let (deleted, indexed) = service.refresh().await.unwrap();
    assert_eq!((deleted, indexed), (0, 0));
}
