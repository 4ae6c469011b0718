// Version registry and inheritance resolution: shadowing, delete-marks,
// branching from a source version, cycle rejection

mod common;

use common::{session, setup_repo, title, todo, write};
use forkstate_core::errors::ExErrorKind;
use forkstate_core::model::{NewVersion, StateFilter, GLOBAL_VERSION_ID, MAIN_VERSION_ID};

#[test]
fn test_reserved_versions_seeded_once() {
    let (temp_dir, repo) = setup_repo();
    let s = session(&repo);

    let versions = s.list_versions().unwrap();
    let ids: Vec<&str> = versions.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec![GLOBAL_VERSION_ID, MAIN_VERSION_ID]);

    let main = s.get_version(MAIN_VERSION_ID).unwrap().unwrap();
    assert_eq!(main.inherits_from_version_id.as_deref(), Some(GLOBAL_VERSION_ID));
    assert_eq!(
        s.commit_parents(&main.working_commit_id).unwrap(),
        vec![main.commit_id.clone()]
    );
    // bootstrap leaves no history behind
    assert!(s.list_changes(&Default::default()).unwrap().is_empty());
    drop(s);
    drop(repo);

    let reopened = forkstate_engine::Repository::open_path(temp_dir.path().join("state.db")).unwrap();
    let s = session(&reopened);
    assert_eq!(s.list_versions().unwrap().len(), 2);
    assert_eq!(s.get_version(MAIN_VERSION_ID).unwrap().unwrap(), main);
}

#[test]
fn test_child_sees_parent_rows_as_inherited() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "parent")).unwrap();
    s.commit().unwrap();
    let feature = s
        .create_version(&NewVersion::named("feature").inheriting("main"))
        .unwrap();

    let row = s.get(&feature.id, &todo("e")).unwrap().unwrap();
    assert_eq!(row.inherited_from_version_id.as_deref(), Some("main"));
    assert_eq!(row.version_id, feature.id);
    assert_eq!(row.snapshot_content["title"], "parent");
}

#[test]
fn test_write_in_child_shadows_inherited_row() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "parent")).unwrap();
    s.commit().unwrap();
    let feature = s
        .create_version(&NewVersion::named("feature").inheriting("main"))
        .unwrap();

    s.update(&feature.id, write("e", "child")).unwrap();
    // visible from the stage before commit
    let staged = s.get(&feature.id, &todo("e")).unwrap().unwrap();
    assert!(staged.inherited_from_version_id.is_none());
    s.commit().unwrap();

    let row = s.get(&feature.id, &todo("e")).unwrap().unwrap();
    assert!(row.inherited_from_version_id.is_none());
    assert_eq!(row.snapshot_content["title"], "child");
    assert_eq!(title(&s, "main", "e").as_deref(), Some("parent"));
}

#[test]
fn test_insert_over_inherited_row_then_delete_keeps_shadow() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "parent")).unwrap();
    s.commit().unwrap();
    let feature = s
        .create_version(&NewVersion::named("feature").inheriting("main"))
        .unwrap();

    s.insert(&feature.id, write("e", "own")).unwrap();
    s.delete(&feature.id, &todo("e")).unwrap();
    assert_eq!(s.staged_count(), 1);
    s.commit().unwrap();

    assert!(s.get(&feature.id, &todo("e")).unwrap().is_none());
    assert_eq!(title(&s, "main", "e").as_deref(), Some("parent"));
}

#[test]
fn test_delete_mark_stops_inheritance_walk() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "parent")).unwrap();
    s.insert("main", write("f", "parent")).unwrap();
    s.commit().unwrap();
    let feature = s
        .create_version(&NewVersion::named("feature").inheriting("main"))
        .unwrap();

    s.delete(&feature.id, &todo("e")).unwrap();
    s.commit().unwrap();

    assert!(s.get(&feature.id, &todo("e")).unwrap().is_none());
    let rows = s.select_state(&StateFilter::version(&feature.id)).unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["f"]);

    // after dropping every cached row the delete-mark is reconstructed
    s.drop_cache(None).unwrap();
    assert!(s.get(&feature.id, &todo("e")).unwrap().is_none());
    assert_eq!(title(&s, &feature.id, "f").as_deref(), Some("parent"));
}

#[test]
fn test_grandchild_resolves_nearest_ancestor() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "main")).unwrap();
    s.commit().unwrap();
    let mid = s
        .create_version(&NewVersion::named("mid").inheriting("main"))
        .unwrap();
    let leaf = s
        .create_version(&NewVersion::named("leaf").inheriting(&mid.id))
        .unwrap();

    let row = s.get(&leaf.id, &todo("e")).unwrap().unwrap();
    assert_eq!(row.inherited_from_version_id.as_deref(), Some("main"));

    s.update(&mid.id, write("e", "mid")).unwrap();
    s.commit().unwrap();
    let row = s.get(&leaf.id, &todo("e")).unwrap().unwrap();
    assert_eq!(row.inherited_from_version_id.as_deref(), Some(mid.id.as_str()));
    assert_eq!(row.snapshot_content["title"], "mid");
}

#[test]
fn test_version_from_source_starts_at_source_head() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "base")).unwrap();
    s.commit().unwrap();
    let main = s.get_version("main").unwrap().unwrap();

    let branch = s
        .create_version(&NewVersion::named("branch").from_version("main"))
        .unwrap();
    assert_eq!(branch.commit_id, main.commit_id);
    assert_ne!(branch.working_commit_id, main.working_commit_id);
    assert_eq!(
        s.commit_parents(&branch.working_commit_id).unwrap(),
        vec![main.commit_id.clone()]
    );

    // the branch owns the rows it started with
    let row = s.get(&branch.id, &todo("e")).unwrap().unwrap();
    assert!(row.inherited_from_version_id.is_none());
    assert_eq!(row.snapshot_content["title"], "base");

    // and diverges independently
    s.update(&branch.id, write("e", "branched")).unwrap();
    s.commit().unwrap();
    assert_eq!(title(&s, "main", "e").as_deref(), Some("base"));
    assert_eq!(title(&s, &branch.id, "e").as_deref(), Some("branched"));
}

#[test]
fn test_version_creation_is_recorded_in_global() {
    let (_temp_dir, repo) = setup_repo();
    let rx = repo.subscribe().unwrap();
    let mut s = session(&repo);

    let feature = s
        .create_version(&NewVersion::named("feature").inheriting("main"))
        .unwrap();
    let event = rx.try_recv().unwrap();
    assert_eq!(event.commits.len(), 1);
    assert_eq!(event.commits[0].version_id, GLOBAL_VERSION_ID);

    let found = s.get_version_by_name("feature").unwrap().unwrap();
    assert_eq!(found, feature);
}

#[test]
fn test_version_name_must_be_unique_and_non_empty() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.create_version(&NewVersion::named("feature")).unwrap();
    let taken = s.create_version(&NewVersion::named("feature")).unwrap_err();
    assert_eq!(taken.kind(), ExErrorKind::ConstraintViolation);

    let empty = s.create_version(&NewVersion::named("  ")).unwrap_err();
    assert_eq!(empty.kind(), ExErrorKind::InvalidInput);

    let missing_parent = s
        .create_version(&NewVersion::named("orphan").inheriting("ghost"))
        .unwrap_err();
    assert_eq!(missing_parent.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_inheritance_cycles_are_rejected() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    let a = s
        .create_version(&NewVersion::named("a").inheriting("main"))
        .unwrap();
    let b = s
        .create_version(&NewVersion::named("b").inheriting(&a.id))
        .unwrap();

    let err = s.set_version_inheritance(&a.id, Some(&b.id)).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::CycleDetected);
    let err = s.set_version_inheritance(&a.id, Some(&a.id)).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::CycleDetected);

    let err = s.set_version_inheritance(GLOBAL_VERSION_ID, Some("main")).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);

    // re-parenting and detaching are fine
    let b = s.set_version_inheritance(&b.id, Some("main")).unwrap();
    assert_eq!(b.inherits_from_version_id.as_deref(), Some("main"));
    let b = s.set_version_inheritance(&b.id, None).unwrap();
    assert!(b.inherits_from_version_id.is_none());
    assert_eq!(
        s.get_version(&b.id).unwrap().unwrap().inherits_from_version_id,
        None
    );
}
