// Explicit change sets, commits, labels, diffs and introspection

mod common;

use common::{session, setup_repo, todo, write};
use forkstate_core::errors::ExErrorKind;
use forkstate_core::model::{
    ChangeFilter, EntityKey, NewChangeSet, BOOKKEEPING_FILE_ID, SCHEMA_CHANGE_SET_ROW,
};
use forkstate_engine::Session;

/// Commit two entities on main and return their change ids
fn two_changes(s: &mut Session) -> (String, String) {
    s.insert("main", write("a", "1")).unwrap();
    s.insert("main", write("b", "1")).unwrap();
    let event = s.commit().unwrap();
    let id_of = |entity: &str| {
        event
            .changes
            .iter()
            .find(|c| c.key() == todo(entity))
            .unwrap()
            .id
            .clone()
    };
    (id_of("a"), id_of("b"))
}

#[test]
fn test_create_change_set_with_elements() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let (a, b) = two_changes(&mut s);

    let created = s
        .create_change_set(&NewChangeSet::with_changes([a.clone(), b.clone()]))
        .unwrap();
    assert!(created.commit_id.is_none());
    assert!(!created.change_set.immutable);

    let elements = s.list_change_set_elements(&created.change_set.id).unwrap();
    let ids: Vec<&str> = elements.iter().map(|e| e.change_id.as_str()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str()]);
}

#[test]
fn test_duplicate_entity_in_change_set_is_rejected() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let (a, _) = two_changes(&mut s);
    s.update("main", write("a", "2")).unwrap();
    let event = s.commit().unwrap();
    let a2 = event
        .changes
        .iter()
        .find(|c| c.key() == todo("a"))
        .unwrap()
        .id
        .clone();

    let sets_before = s.list_change_sets().unwrap().len();
    let err = s
        .create_change_set(&NewChangeSet::with_changes([a, a2]))
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::ConstraintViolation);
    assert_eq!(s.list_change_sets().unwrap().len(), sets_before);

    let err = s
        .create_change_set(&NewChangeSet::with_changes(["missing"]))
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_change_set_with_parents_labels_and_seal() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let (a, b) = two_changes(&mut s);
    let head = s.get_version("main").unwrap().unwrap().commit_id;

    let created = s
        .create_change_set(
            &NewChangeSet::with_changes([a.clone()])
                .parents([head.clone()])
                .labels(["release", "reviewed"])
                .immutable(true),
        )
        .unwrap();
    let commit_id = created.commit_id.unwrap();
    assert_eq!(s.commit_parents(&commit_id).unwrap(), vec![head.clone()]);
    assert!(s.commit_children(&head).unwrap().contains(&commit_id));
    assert!(created.change_set.immutable);

    let set_key = EntityKey::new(&created.change_set.id, SCHEMA_CHANGE_SET_ROW, BOOKKEEPING_FILE_ID);
    let mut names: Vec<String> = s
        .labels_for_entity(&set_key)
        .unwrap()
        .into_iter()
        .map(|l| l.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["release", "reviewed"]);

    // sealed: element edits fail
    let err = s
        .add_change_set_elements(&created.change_set.id, &[b])
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::ImmutabilityViolation);
    let err = s
        .remove_change_set_element(&created.change_set.id, &todo("a"))
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::ImmutabilityViolation);

    // the commit's materialized state holds exactly the listed change
    let diff = s.diff_commits(&head, &commit_id).unwrap();
    assert!(diff.is_empty());
}

#[test]
fn test_mutable_change_set_editing() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let (a, b) = two_changes(&mut s);

    let created = s.create_change_set(&NewChangeSet::default()).unwrap();
    let id = created.change_set.id;
    s.add_change_set_elements(&id, &[a, b.clone()]).unwrap();
    assert_eq!(s.list_change_set_elements(&id).unwrap().len(), 2);

    assert!(s.remove_change_set_element(&id, &todo("a")).unwrap());
    assert!(!s.remove_change_set_element(&id, &todo("a")).unwrap());
    let elements = s.list_change_set_elements(&id).unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].change_id, b);

    let err = s.add_change_set_elements("ghost", &[b]).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_working_change_set_cannot_be_sealed_directly() {
    let (temp_dir, repo) = setup_repo();
    let s = session(&repo);
    let main = s.get_version("main").unwrap().unwrap();
    let working = s.get_commit(&main.working_commit_id).unwrap().unwrap();
    drop(s);

    let conn = rusqlite::Connection::open(temp_dir.path().join("state.db")).unwrap();
    let err = conn
        .execute(
            "UPDATE change_sets SET immutable = 1 WHERE id = ?1",
            [&working.change_set_id],
        )
        .unwrap_err();
    assert!(err.to_string().contains("IMMUTABILITY_VIOLATION"));
}

#[test]
fn test_create_commit_and_diff() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let base = s.get_version("main").unwrap().unwrap().commit_id;
    let (a, b) = two_changes(&mut s);
    let after_insert = s.get_version("main").unwrap().unwrap().commit_id;

    s.update("main", write("a", "2")).unwrap();
    s.delete("main", &todo("b")).unwrap();
    s.insert("main", write("c", "1")).unwrap();
    s.commit().unwrap();
    let after_edit = s.get_version("main").unwrap().unwrap().commit_id;

    let diff = s.diff_commits(&base, &after_insert).unwrap();
    assert_eq!(diff.added.len(), 2);
    assert!(diff.modified.is_empty() && diff.removed.is_empty());

    let diff = s.diff_commits(&after_insert, &after_edit).unwrap();
    assert_eq!(diff.added.iter().map(|e| e.key.clone()).collect::<Vec<_>>(), vec![todo("c")]);
    assert_eq!(diff.modified.len(), 1);
    assert_eq!(diff.modified[0].before_change_id.as_deref(), Some(a.as_str()));
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(diff.removed[0].before_change_id.as_deref(), Some(b.as_str()));

    // wrap a fresh set holding only `b` on top of the edited head
    let created = s.create_change_set(&NewChangeSet::with_changes([b.clone()])).unwrap();
    let commit = s.create_commit(&created.change_set.id, &after_edit).unwrap();
    assert_eq!(commit.change_set_id, created.change_set.id);
    assert_eq!(s.commit_parents(&commit.id).unwrap(), vec![after_edit.clone()]);
    // b's insert is older than its deletion, so b stays removed
    assert!(s.diff_commits(&after_edit, &commit.id).unwrap().is_empty());

    let err = s.create_commit(&created.change_set.id, "ghost").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
    let err = s.diff_commits(&after_edit, "ghost").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_introspection_lists() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let (a, _) = two_changes(&mut s);

    let change = s.get_change(&a).unwrap().unwrap();
    assert_eq!(change.key(), todo("a"));
    assert!(s.get_change("missing").unwrap().is_none());

    let todos = s.list_changes(&ChangeFilter::for_schema("todo")).unwrap();
    assert_eq!(todos.len(), 2);
    let newest = s
        .list_changes(&ChangeFilter {
            descending: true,
            limit: Some(1),
            ..ChangeFilter::default()
        })
        .unwrap();
    assert_eq!(newest.len(), 1);
    assert!(newest[0].id > a);

    let edges = s.list_commit_edges().unwrap();
    let head = s.get_version("main").unwrap().unwrap().commit_id;
    assert!(edges.iter().any(|e| e.child_id == head));
    assert!(s.list_commits().unwrap().len() >= edges.len());

    let checkpoint = s.create_checkpoint("main").unwrap();
    assert!(checkpoint.created);
    let labels = s.list_labels().unwrap();
    assert_eq!(labels.len(), 1);
    let attached = s.list_entity_labels().unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0].label_id, labels[0].id);

    let label = s.label_entity(&todo("a"), "starred").unwrap();
    assert_eq!(s.labels_for_entity(&todo("a")).unwrap(), vec![label]);
    let err = s.label_entity(&todo("a"), "").unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
}
