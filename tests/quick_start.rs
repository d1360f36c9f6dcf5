/*!
 * Dimple History Quick Start
 *
 * End to end walk through of the engine as an application would use it:
 * typed entities saved through the write path, a history view listing
 * versions, previewing an old version, restoring it, and observing the
 * events a UI would refresh on.
 */

use dimple_history::db::{Author, DbEvent};
use dimple_history::Db;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
pub struct Page {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

#[test]
fn quick_start() -> anyhow::Result<()> {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();

    let dir = tempfile::tempdir()?;
    let db = Db::open(dir.path().join("pages.db"))?;
    let events = db.subscribe();

    let alice = Author::new("u_alice", "Alice");
    let bob = Author::new("u_bob", "Bob");

    let mut page = Page {
        title: "Meeting notes".to_string(),
        ..Default::default()
    };
    let created = db.save("p1", &page, &alice)?.unwrap();

    page.body = "Agenda: roadmap".to_string();
    let drafted = db.save("p1", &page, &alice)?.unwrap();

    page.body = "Agenda: roadmap, hiring".to_string();
    page.tags.push("weekly".to_string());
    db.save("p1", &page, &bob)?.unwrap();

    // The history view, newest first.
    let history = db.list_versions("p1", 10)?;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].author_name, "Bob");
    assert_eq!(history[2].id, created.id);

    // Preview the draft without touching the live page.
    let preview: Page = db.reconstruct_at("p1", &drafted.id)?.to_entity()?;
    assert_eq!(preview.body, "Agenda: roadmap");
    assert!(preview.tags.is_empty());
    assert_eq!(db.get::<Page>("p1")?, Some(page));

    // Restore it.
    let restored = db.restore("p1", &drafted.id, &alice)?.unwrap();
    assert_eq!(db.get::<Page>("p1")?, Some(preview));
    assert_eq!(db.list_versions("p1", 10)?.len(), 4);

    let received: Vec<DbEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 4);
    assert_eq!(
        received.last(),
        Some(&DbEvent::Restored("p1".to_string(), restored.id))
    );
    Ok(())
}
