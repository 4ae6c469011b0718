// State cache: every row is disposable; reconstruction yields the same rows

mod common;

use common::{session, setup_repo, setup_repo_with, todo, write};
use forkstate_core::model::{NewVersion, StateFilter};
use forkstate_engine::Session;

fn seeded(s: &mut Session) {
    s.insert("main", write("a", "1")).unwrap();
    s.insert("main", write("b", "1")).unwrap();
    s.insert("main", write("c", "1")).unwrap();
    s.commit().unwrap();
    s.create_checkpoint("main").unwrap();
    s.update("main", write("a", "2")).unwrap();
    s.delete("main", &todo("b")).unwrap();
    s.commit().unwrap();
}

#[test]
fn test_dropping_one_row_reads_back_identically() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    seeded(&mut s);

    let before = s.get("main", &todo("a")).unwrap().unwrap();
    assert!(s.drop_cache_entry("main", &todo("a")).unwrap());
    let after = s.get("main", &todo("a")).unwrap().unwrap();
    assert_eq!(after, before);

    // read-through put it back
    assert!(s.drop_cache_entry("main", &todo("a")).unwrap());
}

#[test]
fn test_drop_all_then_select_matches() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    seeded(&mut s);
    let feature = s
        .create_version(&NewVersion::named("feature").inheriting("main"))
        .unwrap();
    s.update(&feature.id, write("c", "feature")).unwrap();
    s.commit().unwrap();

    let main_before = s.select_state(&StateFilter::version("main")).unwrap();
    let feature_before = s.select_state(&StateFilter::version(&feature.id)).unwrap();
    assert_eq!(main_before.len(), 2);

    assert!(s.drop_cache(None).unwrap() > 0);
    assert_eq!(s.select_state(&StateFilter::version("main")).unwrap(), main_before);
    assert_eq!(
        s.select_state(&StateFilter::version(&feature.id)).unwrap(),
        feature_before
    );
}

#[test]
fn test_rebuild_cache_restores_rows() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    seeded(&mut s);
    let before = s.select_state(&StateFilter::version("main")).unwrap();

    s.drop_cache(Some("main")).unwrap();
    // a, c live and the delete-mark for b
    assert_eq!(s.rebuild_cache("main").unwrap(), 3);
    assert_eq!(s.select_state(&StateFilter::version("main")).unwrap(), before);
    assert!(s.get("main", &todo("b")).unwrap().is_none());
}

#[test]
fn test_commits_after_drop_keep_cache_consistent() {
    let (_temp_dir, repo) = setup_repo();
    let mut s = session(&repo);
    seeded(&mut s);

    s.drop_cache(Some("main")).unwrap();
    s.insert("main", write("d", "1")).unwrap();
    s.update("main", write("c", "2")).unwrap();
    s.commit().unwrap();

    let rows = s.select_state(&StateFilter::version("main")).unwrap();
    let titles: Vec<(String, String)> = rows
        .iter()
        .map(|r| {
            (
                r.entity_id.clone(),
                r.snapshot_content["title"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        titles,
        vec![
            ("a".to_string(), "2".to_string()),
            ("c".to_string(), "2".to_string()),
            ("d".to_string(), "1".to_string()),
        ]
    );
}

#[test]
fn test_reads_without_read_through_leave_cache_empty() {
    let (_temp_dir, repo) = setup_repo_with(|mut config| {
        config.cache_read_through = false;
        config
    });
    let mut s = session(&repo);
    seeded(&mut s);
    let before = s.get("main", &todo("a")).unwrap().unwrap();

    s.drop_cache(Some("main")).unwrap();
    assert_eq!(s.get("main", &todo("a")).unwrap().unwrap(), before);
    // nothing was written back
    assert!(!s.drop_cache_entry("main", &todo("a")).unwrap());
    assert_eq!(s.drop_cache(Some("main")).unwrap(), 0);
}

#[test]
fn test_read_degrades_to_uncached_when_cache_is_locked() {
    let (temp_dir, repo) = setup_repo_with(|mut config| {
        config.busy_timeout_ms = 50;
        config
    });
    let mut s = session(&repo);
    seeded(&mut s);
    let before = s.get("main", &todo("a")).unwrap().unwrap();
    let rows_before = s.select_state(&StateFilter::version("main")).unwrap();
    s.drop_cache(Some("main")).unwrap();

    // another process holds the write lock
    let blocker = rusqlite::Connection::open(temp_dir.path().join("state.db")).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

    assert_eq!(s.get("main", &todo("a")).unwrap().unwrap(), before);
    assert_eq!(s.select_state(&StateFilter::version("main")).unwrap(), rows_before);

    blocker.execute_batch("ROLLBACK;").unwrap();
    // nothing was stored while the lock was held
    assert!(!s.drop_cache_entry("main", &todo("a")).unwrap());
}
