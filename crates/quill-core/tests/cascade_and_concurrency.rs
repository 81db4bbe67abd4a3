//! Ownership cascades and writer serialization.

use std::sync::Arc;

use quill_core::store::types::{
    Actor, NewNote, NewProject, NewTask, NewUser, PageRequest, TaskFilter,
};
use quill_core::{Store, StoreError};

#[test]
fn deleting_a_project_removes_everything_it_owns() {
    let store = Store::in_memory().unwrap();
    let owner = store
        .create_user(&Actor::system(), NewUser::new("owner", "hash"))
        .unwrap();
    let actor = Actor::user(owner.id);

    let project = store
        .create_project(&actor, NewProject::new("Doomed", owner.id))
        .unwrap();
    let note = store
        .create_note(
            &actor,
            NewNote::new(project.id, "N1", "n1.md").with_content("xanthic"),
        )
        .unwrap();
    let t1 = store
        .create_task(&actor, NewTask::new(project.id, "T1", owner.id))
        .unwrap();
    let t2 = store
        .create_task(
            &actor,
            NewTask::new(project.id, "T2", owner.id).with_parent(t1.id),
        )
        .unwrap();
    store.attach_note(&actor, &t2.id, &note.id).unwrap();

    store.delete_project(&actor, &project.id).unwrap();

    assert!(store.get_project(&project.id).unwrap().is_none());
    assert!(store.get_note(&note.id).unwrap().is_none());
    assert!(store.get_task(&t1.id).unwrap().is_none());
    assert!(store.get_task(&t2.id).unwrap().is_none());
    assert_eq!(store.search_notes("xanthic", None, None).unwrap().len(), 0);
    assert!(matches!(
        store.list_task_notes(&t2.id),
        Err(StoreError::NotFound(_))
    ));

    // The owning user is untouched.
    assert!(store.get_user(&owner.id).unwrap().is_some());
}

#[test]
fn concurrent_writers_are_fully_serialized() {
    let store = Arc::new(Store::in_memory().unwrap());
    let owner = store
        .create_user(&Actor::system(), NewUser::new("racer", "hash"))
        .unwrap();
    let project = store
        .create_project(&Actor::user(owner.id), NewProject::new("Race", owner.id))
        .unwrap();

    let per_thread: u64 = 10;
    let mut handles = Vec::new();
    for thread in 0..2 {
        let store = Arc::clone(&store);
        let owner_id = owner.id;
        let project_id = project.id;
        handles.push(std::thread::spawn(move || {
            let actor = Actor::user(owner_id);
            for i in 0..per_thread {
                store
                    .create_task(
                        &actor,
                        NewTask::new(project_id, format!("t{}-{}", thread, i), owner_id),
                    )
                    .expect("serialized write should succeed");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let tasks = store
        .list_tasks(
            &TaskFilter {
                project_id: Some(project.id),
                ..Default::default()
            },
            PageRequest::new(1, 100),
        )
        .unwrap();
    assert_eq!(tasks.total_items, 2 * per_thread);

    // Every task carries exactly one create audit entry: no lost or
    // interleaved sub-steps.
    let audit = store
        .list_audit(
            &quill_core::store::types::AuditFilter {
                resource_type: Some("task".to_string()),
                ..Default::default()
            },
            PageRequest::new(1, 100),
        )
        .unwrap();
    assert_eq!(audit.total_items, 2 * per_thread);
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quill.db");

    let note_id;
    {
        let store = Store::open(&path).unwrap();
        let owner = store
            .create_user(&Actor::system(), NewUser::new("owner", "hash"))
            .unwrap();
        let actor = Actor::user(owner.id);
        let project = store
            .create_project(&actor, NewProject::new("Durable", owner.id))
            .unwrap();
        note_id = store
            .create_note(
                &actor,
                NewNote::new(project.id, "Persisted", "p.md").with_content("tourmaline"),
            )
            .unwrap()
            .id;
        store.close().unwrap();
    }

    let store = Store::open(&path).unwrap();
    let note = store.get_note(&note_id).unwrap().unwrap();
    assert_eq!(note.title, "Persisted");
    assert_eq!(store.search_notes("tourmaline", None, None).unwrap().len(), 1);
    store.close().unwrap();
}
