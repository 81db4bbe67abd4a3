//! The search index must hold exactly the set of committed notes, with
//! content matching each note's latest revision.

use quill_core::store::types::{Actor, NewNote, NewProject, NewUser, NoteUpdate};
use quill_core::Store;
use uuid::Uuid;

fn setup() -> (Store, Actor, Uuid) {
    let store = Store::in_memory().unwrap();
    let owner = store
        .create_user(&Actor::system(), NewUser::new("writer", "hash"))
        .unwrap();
    let actor = Actor::user(owner.id);
    let project = store
        .create_project(&actor, NewProject::new("Journal", owner.id))
        .unwrap();
    (store, actor, project.id)
}

#[test]
fn index_follows_note_lifecycle() {
    let (store, actor, project) = setup();

    let note = store
        .create_note(
            &actor,
            NewNote::new(project, "Alpha", "alpha.md").with_content("Alpha"),
        )
        .unwrap();
    assert_eq!(store.search_notes("Alpha", None, None).unwrap().len(), 1);

    store
        .update_note(
            &actor,
            &note.id,
            NoteUpdate {
                title: Some("Renamed".to_string()),
                content: Some("Beta".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        store.search_notes("Alpha", None, None).unwrap().len(),
        0,
        "stale terms must not linger after update"
    );
    assert_eq!(store.search_notes("Beta", None, None).unwrap().len(), 1);

    store.delete_note(&actor, &note.id).unwrap();
    assert_eq!(store.search_notes("Beta", None, None).unwrap().len(), 0);
}

#[test]
fn tags_are_searchable() {
    let (store, actor, project) = setup();

    store
        .create_note(
            &actor,
            NewNote::new(project, "Meeting minutes", "mtg.md")
                .with_tags(vec!["quarterly".to_string()]),
        )
        .unwrap();

    let hits = store.search_notes("quarterly", None, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Meeting minutes");
}

#[test]
fn project_filter_restricts_results() {
    let (store, actor, project_a) = setup();
    let project_b = store
        .create_project(
            &actor,
            NewProject::new("Second", store.get_project(&project_a).unwrap().unwrap().owner_id),
        )
        .unwrap();

    store
        .create_note(
            &actor,
            NewNote::new(project_a, "Shared term", "a.md").with_content("meridian"),
        )
        .unwrap();
    store
        .create_note(
            &actor,
            NewNote::new(project_b.id, "Shared term", "b.md").with_content("meridian"),
        )
        .unwrap();

    assert_eq!(store.search_notes("meridian", None, None).unwrap().len(), 2);
    let scoped = store
        .search_notes("meridian", Some(&project_a), None)
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].project_id, project_a);
}

#[test]
fn result_limit_is_honored_and_capped() {
    let (store, actor, project) = setup();

    for i in 0..5 {
        store
            .create_note(
                &actor,
                NewNote::new(project, format!("note {}", i), format!("n{}.md", i))
                    .with_content("heliotrope"),
            )
            .unwrap();
    }

    assert_eq!(
        store
            .search_notes("heliotrope", None, Some(2))
            .unwrap()
            .len(),
        2
    );
    // A limit beyond the maximum is capped, not an error.
    assert_eq!(
        store
            .search_notes("heliotrope", None, Some(10_000))
            .unwrap()
            .len(),
        5
    );
}

#[test]
fn hostile_query_text_is_inert() {
    let (store, actor, project) = setup();
    store
        .create_note(
            &actor,
            NewNote::new(project, "Plain", "p.md").with_content("content here"),
        )
        .unwrap();

    // FTS5 operator syntax must not produce a syntax error or widen the match.
    assert!(store.search_notes("\"", None, None).is_ok());
    assert!(store.search_notes("content OR", None, None).is_ok());
    assert!(store.search_notes("title:*", None, None).is_ok());
    assert_eq!(store.search_notes("   ", None, None).unwrap().len(), 0);
    assert_eq!(store.search_notes("", None, None).unwrap().len(), 0);
}
