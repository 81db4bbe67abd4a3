//! CRUD and pagination behavior of the record store.

use quill_core::store::types::{
    Actor, NewNote, NewProject, NewTask, NewUser, PageRequest, ProjectFilter, ProjectUpdate,
    TaskFilter, TaskStatus, TaskUpdate, UserRole,
};
use quill_core::{Store, StoreError};
use uuid::Uuid;

fn setup() -> (Store, Actor, Uuid) {
    let store = Store::in_memory().expect("in-memory store should open");
    let owner = store
        .create_user(&Actor::system(), NewUser::new("owner", "hash"))
        .expect("owner should be created");
    let actor = Actor::user(owner.id);
    (store, actor, owner.id)
}

#[test]
fn user_create_and_lookup() {
    let (store, actor, _) = setup();

    let user = store
        .create_user(
            &actor,
            NewUser::new("Alice_99", "argon2id$...")
                .with_email("alice@example.com")
                .with_role(UserRole::Admin),
        )
        .unwrap();
    // Username is normalized to lowercase before storage.
    assert_eq!(user.username, "alice_99");
    assert_eq!(user.role, UserRole::Admin);
    assert!(user.is_active);

    let by_name = store.get_user_by_username("ALICE_99").unwrap().unwrap();
    assert_eq!(by_name.id, user.id);
}

#[test]
fn duplicate_username_is_conflict() {
    let (store, actor, _) = setup();

    store
        .create_user(&actor, NewUser::new("sam", "h1"))
        .unwrap();
    let err = store
        .create_user(&actor, NewUser::new("sam", "h2"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn invalid_inputs_are_rejected_before_any_write() {
    let (store, actor, owner) = setup();

    assert!(matches!(
        store.create_user(&actor, NewUser::new("ab", "h")),
        Err(StoreError::InvalidInput(_))
    ));
    assert!(matches!(
        store.create_project(&actor, NewProject::new("p", owner).with_color("red")),
        Err(StoreError::InvalidInput(_))
    ));
    assert!(matches!(
        store.create_project(&actor, NewProject::new("", owner)),
        Err(StoreError::InvalidInput(_))
    ));

    // Nothing was audited for rejected inputs beyond the setup user.
    let audit = store
        .list_audit(&Default::default(), PageRequest::default())
        .unwrap();
    assert_eq!(audit.total_items, 1);
}

#[test]
fn project_update_patches_only_supplied_fields() {
    let (store, actor, owner) = setup();

    let project = store
        .create_project(
            &actor,
            NewProject::new("Research", owner).with_description("long-term"),
        )
        .unwrap();

    let updated = store
        .update_project(
            &actor,
            &project.id,
            ProjectUpdate {
                is_archived: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(updated.is_archived);
    assert_eq!(updated.name, "Research");
    assert_eq!(updated.description.as_deref(), Some("long-term"));
    assert!(updated.updated_at >= project.updated_at);
}

#[test]
fn delete_twice_returns_not_found() {
    let (store, actor, owner) = setup();
    let project = store
        .create_project(&actor, NewProject::new("Temp", owner))
        .unwrap();

    store.delete_project(&actor, &project.id).unwrap();
    let err = store.delete_project(&actor, &project.id).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn duplicate_note_path_in_project_is_conflict() {
    let (store, actor, owner) = setup();
    let project = store
        .create_project(&actor, NewProject::new("Docs", owner))
        .unwrap();

    store
        .create_note(&actor, NewNote::new(project.id, "A", "notes/a.md"))
        .unwrap();
    let err = store
        .create_note(&actor, NewNote::new(project.id, "B", "notes/a.md"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // Same path in a different project is fine.
    let other = store
        .create_project(&actor, NewProject::new("Other", owner))
        .unwrap();
    store
        .create_note(&actor, NewNote::new(other.id, "C", "notes/a.md"))
        .unwrap();
}

#[test]
fn task_filters_combine_with_and() {
    let (store, actor, owner) = setup();
    let project = store
        .create_project(&actor, NewProject::new("Work", owner))
        .unwrap();

    let t1 = store
        .create_task(
            &actor,
            NewTask::new(project.id, "Urgent tagged", owner)
                .with_tags(vec!["infra".to_string()]),
        )
        .unwrap();
    store
        .create_task(&actor, NewTask::new(project.id, "Untagged", owner))
        .unwrap();
    store
        .update_task(
            &actor,
            &t1.id,
            TaskUpdate {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
        )
        .unwrap();

    let filter = TaskFilter {
        project_id: Some(project.id),
        status: Some(TaskStatus::InProgress),
        tag: Some("infra".to_string()),
        ..Default::default()
    };
    let page = store.list_tasks(&filter, PageRequest::default()).unwrap();
    assert_eq!(page.total_items, 1);
    assert_eq!(page.items[0].id, t1.id);

    let none = store
        .list_tasks(
            &TaskFilter {
                status: Some(TaskStatus::Done),
                ..filter
            },
            PageRequest::default(),
        )
        .unwrap();
    assert_eq!(none.total_items, 0);
}

#[test]
fn deadline_queries_order_by_deadline_ascending() {
    let (store, actor, owner) = setup();
    let project = store
        .create_project(&actor, NewProject::new("Sprints", owner))
        .unwrap();

    let base = chrono::Utc::now();
    for days in [5i64, 1, 3] {
        store
            .create_task(
                &actor,
                NewTask::new(project.id, format!("due+{}", days), owner)
                    .with_deadline(base + chrono::Duration::days(days)),
            )
            .unwrap();
    }
    // No deadline at all; excluded from deadline queries.
    store
        .create_task(&actor, NewTask::new(project.id, "someday", owner))
        .unwrap();

    let page = store
        .list_tasks(
            &TaskFilter {
                due_before: Some(base + chrono::Duration::days(10)),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .unwrap();
    let titles: Vec<&str> = page.items.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["due+1", "due+3", "due+5"]);
}

#[test]
fn pagination_laws_over_2n_plus_1_items() {
    let (store, actor, owner) = setup();
    let project = store
        .create_project(&actor, NewProject::new("Bulk", owner))
        .unwrap();

    let n = 3u32;
    for i in 0..(2 * n + 1) {
        store
            .create_task(&actor, NewTask::new(project.id, format!("task-{}", i), owner))
            .unwrap();
    }

    let filter = TaskFilter {
        project_id: Some(project.id),
        ..Default::default()
    };
    let p1 = store.list_tasks(&filter, PageRequest::new(1, n)).unwrap();
    let p2 = store.list_tasks(&filter, PageRequest::new(2, n)).unwrap();
    let p3 = store.list_tasks(&filter, PageRequest::new(3, n)).unwrap();

    assert_eq!(p1.total_items, u64::from(2 * n + 1));
    assert_eq!(p1.total_pages, 3);
    assert!(p1.has_next && !p1.has_prev);
    assert!(p2.has_next && p2.has_prev);
    assert!(!p3.has_next && p3.has_prev);
    assert_eq!(p3.items.len(), 1);

    let mut seen: Vec<Uuid> = p1
        .items
        .iter()
        .chain(p2.items.iter())
        .chain(p3.items.iter())
        .map(|t| t.id)
        .collect();
    let before_dedup = seen.len();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), before_dedup, "pages must be disjoint");
    assert_eq!(seen.len() as u64, p1.total_items, "union must cover dataset");
}

#[test]
fn page_bounds_are_validated() {
    let (store, _, _) = setup();
    let err = store
        .list_projects(&ProjectFilter::default(), PageRequest::new(0, 10))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));

    let err = store
        .list_projects(&ProjectFilter::default(), PageRequest::new(1, 1000))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
}
