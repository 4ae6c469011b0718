// Commit pipeline: commits per version, `global` last, working sets,
// checkpoints, failure atomicity and notifications

mod common;

use common::{content, session, setup_repo, title, todo, write};
use forkstate_core::errors::ExErrorKind;
use forkstate_core::model::{
    AncestryOptions, EntityKey, EntityWrite, StateFilter, BOOKKEEPING_FILE_ID, CHECKPOINT_LABEL,
    SCHEMA_CHANGE_SET_ROW, SCHEMA_VERSION_ROW,
};
use rusqlite::Connection;

#[test]
fn test_checkpoint_scenario() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let c0 = s.get_version("main").unwrap().unwrap().commit_id;

    // insert a = "1"
    s.insert("main", write("a", "1")).unwrap();
    let event = s.commit().unwrap();
    let c1 = event.commit_for("main").unwrap().commit_id.clone();
    assert_eq!(s.commit_parents(&c1).unwrap(), vec![c0.clone()]);
    assert_eq!(title(&s, "main", "a").as_deref(), Some("1"));
    assert_eq!(
        s.get("main", &todo("a")).unwrap().unwrap().commit_id.as_deref(),
        Some(c1.as_str())
    );

    // checkpoint
    let cp1 = s.create_checkpoint("main").unwrap();
    assert!(cp1.created);
    let main = s.get_version("main").unwrap().unwrap();
    assert_eq!(main.commit_id, cp1.commit_id);
    assert_eq!(
        s.commit_parents(&main.working_commit_id).unwrap(),
        vec![cp1.commit_id.clone()]
    );
    let sealed = s.get_commit(&cp1.commit_id).unwrap().unwrap();
    assert!(s.get_change_set(&sealed.change_set_id).unwrap().unwrap().immutable);
    let labels = s
        .labels_for_entity(&EntityKey::new(
            &sealed.change_set_id,
            SCHEMA_CHANGE_SET_ROW,
            BOOKKEEPING_FILE_ID,
        ))
        .unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].name, CHECKPOINT_LABEL);

    // update a = "2"
    s.update("main", write("a", "2")).unwrap();
    let event = s.commit().unwrap();
    let c2 = event.commit_for("main").unwrap().commit_id.clone();
    assert_eq!(s.commit_parents(&c2).unwrap(), vec![cp1.commit_id.clone()]);

    let update = event
        .changes
        .iter()
        .find(|c| c.key() == todo("a"))
        .unwrap();
    let working = s.working_changes("main").unwrap();
    assert_eq!(working.len(), 1);
    assert_eq!(working[0].change.id, update.id);
    assert_eq!(working[0].change.snapshot_content, Some(content("2")));

    // checkpoint again
    let cp2 = s.create_checkpoint("main").unwrap();
    assert!(cp2.created);
    assert_ne!(cp2.commit_id, cp1.commit_id);
    assert!(s.working_changes("main").unwrap().is_empty());
    assert_eq!(title(&s, "main", "a").as_deref(), Some("2"));
}

#[test]
fn test_resolved_row_is_latest_reachable_change() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("a", "v1")).unwrap();
    s.commit().unwrap();
    s.update("main", write("a", "v2")).unwrap();
    s.commit().unwrap();
    s.create_checkpoint("main").unwrap();
    s.update("main", write("a", "v3")).unwrap();
    s.commit().unwrap();

    let history = s.entity_history("main", &todo("a")).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].snapshot_content, Some(content("v3")));

    let row = s.get("main", &todo("a")).unwrap().unwrap();
    assert_eq!(row.change_id.as_deref(), Some(history[0].id.as_str()));
    assert_eq!(row.created_at, history[2].created_at);
    assert_eq!(row.updated_at, history[0].created_at);
}

#[test]
fn test_checkpoint_without_writes_is_idempotent() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let before = s.get_version("main").unwrap().unwrap();
    let sequence = s.round_sequence().unwrap();

    let first = s.create_checkpoint("main").unwrap();
    let second = s.create_checkpoint("main").unwrap();
    assert!(!first.created);
    assert!(!second.created);
    assert_eq!(first.commit_id, before.commit_id);
    assert_eq!(second.commit_id, before.commit_id);
    assert_eq!(s.get_version("main").unwrap().unwrap(), before);
    assert_eq!(s.round_sequence().unwrap(), sequence);

    s.insert("main", write("a", "1")).unwrap();
    s.commit().unwrap();
    let created = s.create_checkpoint("main").unwrap();
    let after = s.get_version("main").unwrap().unwrap();
    let repeated = s.create_checkpoint("main").unwrap();
    assert!(created.created);
    assert!(!repeated.created);
    assert_eq!(repeated.commit_id, created.commit_id);
    assert_eq!(s.get_version("main").unwrap().unwrap(), after);
}

#[test]
fn test_later_commit_descends_from_earlier() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("a", "1")).unwrap();
    let a = s.commit().unwrap().commit_for("main").unwrap().commit_id.clone();
    s.create_checkpoint("main").unwrap();
    s.insert("main", write("b", "1")).unwrap();
    let b = s.commit().unwrap().commit_for("main").unwrap().commit_id.clone();

    assert!(s.is_ancestor_of(&a, &b, AncestryOptions::default()).unwrap());
    assert!(!s.is_ancestor_of(&b, &a, AncestryOptions::default()).unwrap());
    assert!(!s.is_ancestor_of(&a, &a, AncestryOptions::default()).unwrap());
    assert!(s.is_ancestor_of(&a, &a, AncestryOptions::including_self()).unwrap());
    // a -> checkpoint -> b
    assert!(!s
        .is_ancestor_of(&a, &b, AncestryOptions::default().with_max_depth(1))
        .unwrap());
    assert!(s
        .is_ancestor_of(&a, &b, AncestryOptions::default().with_max_depth(2))
        .unwrap());

    let err = s
        .is_ancestor_of(&a, "missing", AncestryOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_insert_then_delete_leaves_no_working_element() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "tmp")).unwrap();
    s.commit().unwrap();
    assert_eq!(s.working_changes("main").unwrap().len(), 1);

    s.delete("main", &todo("e")).unwrap();
    s.commit().unwrap();
    assert!(s.working_changes("main").unwrap().is_empty());
    assert!(s.get("main", &todo("e")).unwrap().is_none());
}

#[test]
fn test_delete_of_checkpointed_entity_keeps_one_deletion() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("e", "kept")).unwrap();
    s.commit().unwrap();
    s.create_checkpoint("main").unwrap();

    s.delete("main", &todo("e")).unwrap();
    s.commit().unwrap();

    let working = s.working_changes("main").unwrap();
    assert_eq!(working.len(), 1);
    assert_eq!(working[0].change.key(), todo("e"));
    assert!(working[0].change.is_deletion());
    assert!(s.get("main", &todo("e")).unwrap().is_none());
}

#[test]
fn test_staged_insert_and_delete_cancel_out() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let sequence = s.round_sequence().unwrap();

    s.insert("main", write("e", "tmp")).unwrap();
    s.delete("main", &todo("e")).unwrap();
    assert_eq!(s.staged_count(), 0);

    let event = s.commit().unwrap();
    assert!(event.is_empty());
    assert_eq!(event.round, sequence);
}

#[test]
fn test_global_is_committed_last_with_bookkeeping() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("global", write("shared", "g")).unwrap();
    s.insert("main", write("a", "1")).unwrap();
    let event = s.commit().unwrap();

    let versions: Vec<&str> = event.commits.iter().map(|c| c.version_id.as_str()).collect();
    assert_eq!(versions, vec!["main", "global"]);

    let global_commit = event.commit_for("global").unwrap();
    let elements = s
        .list_change_set_elements(&global_commit.change_set_id)
        .unwrap();
    assert!(elements.iter().any(|e| e.key() == todo("shared")));
    assert!(elements
        .iter()
        .any(|e| e.schema_key == SCHEMA_VERSION_ROW && e.entity_id == "main"));

    // the version row in global reflects main's new head
    let main_head = event.commit_for("main").unwrap().commit_id.clone();
    let rows = s
        .select_state(&StateFilter::version("global").schema(SCHEMA_VERSION_ROW))
        .unwrap();
    let main_row = rows.iter().find(|r| r.entity_id == "main").unwrap();
    assert_eq!(main_row.snapshot_content["commit_id"], main_head.as_str());

    // bookkeeping stays out of the default view, the global write is inherited
    let visible = s.select_state(&StateFilter::version("main")).unwrap();
    assert!(visible.iter().all(|r| !r.key().is_bookkeeping()));
    let shared = visible.iter().find(|r| r.entity_id == "shared").unwrap();
    assert_eq!(shared.inherited_from_version_id.as_deref(), Some("global"));
}

#[test]
fn test_round_shares_timestamp_and_advances_sequence_once() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let before = s.round_sequence().unwrap();

    s.insert("main", write("a", "1")).unwrap();
    s.insert("main", write("b", "1")).unwrap();
    let event = s.commit().unwrap();

    assert_eq!(event.round, before + 1);
    assert_eq!(s.round_sequence().unwrap(), before + 1);
    assert!(event.changes.len() > 2);
    let created_at = &event.changes[0].created_at;
    assert!(event.changes.iter().all(|c| &c.created_at == created_at));

    let mut ids: Vec<&str> = event.changes.iter().map(|c| c.id.as_str()).collect();
    let unsorted = ids.clone();
    ids.sort_unstable();
    assert_eq!(ids, unsorted);
}

#[test]
fn test_stage_is_private_to_session() {
    let (_temp_dir, repo) = setup_repo();
    let mut writer = session(&repo);
    let reader = session(&repo);

    writer.insert("main", write("a", "draft")).unwrap();
    assert_eq!(title(&writer, "main", "a").as_deref(), Some("draft"));
    assert!(title(&reader, "main", "a").is_none());

    writer.commit().unwrap();
    assert_eq!(title(&reader, "main", "a").as_deref(), Some("draft"));
}

#[test]
fn test_failed_round_rolls_back_and_keeps_stage() {
    let (temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    let before = s.get_version("main").unwrap().unwrap();
    let commits_before = s.list_commits().unwrap().len();
    let sequence = s.round_sequence().unwrap();

    let raw = Connection::open(temp_dir.path().join("state.db")).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER poison_changes BEFORE INSERT ON changes
         WHEN NEW.entity_id = 'poison'
         BEGIN SELECT RAISE(ABORT, 'poisoned change'); END;",
    )
    .unwrap();

    s.insert("main", write("a", "1")).unwrap();
    s.insert("main", write("poison", "x")).unwrap();
    let err = s.commit().unwrap_err();
    assert!(err.request_id().is_some());

    assert_eq!(s.get_version("main").unwrap().unwrap(), before);
    assert_eq!(s.list_commits().unwrap().len(), commits_before);
    assert_eq!(s.round_sequence().unwrap(), sequence);
    assert_eq!(s.staged_count(), 2);
    assert!(title(&session(&repo), "main", "a").is_none());

    raw.execute_batch("DROP TRIGGER poison_changes;").unwrap();
    let event = s.commit().unwrap();
    assert_eq!(event.round, sequence + 1);
    assert_eq!(s.staged_count(), 0);
    assert_eq!(title(&session(&repo), "main", "a").as_deref(), Some("1"));
}

#[test]
fn test_subscribers_receive_commit_events() {
    let (_temp_dir, repo) = setup_repo();
    let rx = repo.subscribe().unwrap();
    let mut s = session(&repo);

    // nothing to announce
    s.commit().unwrap();
    assert!(rx.try_recv().is_err());

    s.insert("main", write("a", "1")).unwrap();
    let event = s.commit().unwrap();
    let received = rx.try_recv().unwrap();
    assert_eq!(received, event);
    assert_eq!(&received.session_id, s.id());

    drop(rx);
    s.update("main", write("a", "2")).unwrap();
    s.commit().unwrap();
}

#[test]
fn test_write_validation_errors() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);

    s.insert("main", write("a", "1")).unwrap();
    s.commit().unwrap();

    let dup = s.insert("main", write("a", "again")).unwrap_err();
    assert_eq!(dup.kind(), ExErrorKind::ConstraintViolation);

    let missing = s.update("main", write("nope", "x")).unwrap_err();
    assert_eq!(missing.kind(), ExErrorKind::NotFound);

    let no_version = s.insert("ghost", write("b", "x")).unwrap_err();
    assert_eq!(no_version.kind(), ExErrorKind::NotFound);

    let reserved = EntityWrite::new(
        EntityKey::new("main", SCHEMA_VERSION_ROW, BOOKKEEPING_FILE_ID),
        content("x"),
    );
    let err = s.insert("global", reserved).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);

    let blank = EntityWrite::new(EntityKey::new(" ", "todo", "f"), content("x"));
    assert_eq!(
        s.insert("main", blank).unwrap_err().kind(),
        ExErrorKind::InvalidInput
    );

    assert_eq!(s.staged_count(), 0);
}

#[test]
fn test_discard_staged() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    s.insert("main", write("a", "1")).unwrap();
    s.insert("main", write("b", "1")).unwrap();

    assert_eq!(s.discard_staged(), 2);
    assert!(title(&s, "main", "a").is_none());
    assert!(s.commit().unwrap().is_empty());
}
