use std::cell::RefCell;

use rusqlite::{params, OptionalExtension, Transaction};

use crate::db::changes::compute_diff;
use crate::db::types::{Author, DbEvent, Document, Entity, Fields, Version};
use crate::db::Db;
use crate::error::{HistoryError, Result};

pub struct DbTransaction<'a> {
    db: &'a Db,
    txn: &'a Transaction<'a>,
    pending_events: RefCell<Vec<DbEvent>>,
}

impl<'a> DbTransaction<'a> {
    pub(crate) fn new(db: &'a Db, txn: &'a Transaction<'a>) -> Self {
        Self {
            db,
            txn,
            pending_events: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn db(&self) -> &Db {
        self.db
    }

    pub(crate) fn txn(&self) -> &Transaction<'a> {
        self.txn
    }

    /// Reads the live document, or None if it does not exist.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let fields: Option<String> = self
            .txn
            .query_row("SELECT fields FROM ZV_DOCUMENT WHERE id = ?", [id], |row| row.get(0))
            .optional()?;
        fields
            .map(|json| {
                serde_json::from_str::<Fields>(&json)
                    .map(|fields| Document::with_fields(id, fields))
                    .map_err(|e| HistoryError::Corrupted(format!("document {}: {}", id, e)))
            })
            .transpose()
    }

    /// Replaces the live document with `document`, creating it if needed.
    ///
    /// This is the write path every mutation goes through. The new state
    /// is diffed against the live row as read inside this transaction and,
    /// if anything changed, one Version is appended to the document's log
    /// and returned. Saving an unchanged document writes nothing and
    /// returns None.
    pub fn save_document(&self, document: &Document, author: &Author) -> Result<Option<Version>> {
        let old = self.get_document(&document.id)?;
        let version = self.write_document(old.as_ref(), document, author, None)?;
        if let Some(version) = &version {
            self.pending_events
                .borrow_mut()
                .push(DbEvent::Saved(document.id.clone(), version.id.clone()));
        }
        Ok(version)
    }

    /// Shortcut for saving a typed entity as the fields of document `id`.
    pub fn save<E: Entity>(&self, id: &str, entity: &E, author: &Author) -> Result<Option<Version>> {
        self.save_document(&Document::from_entity(id, entity)?, author)
    }

    /// Writes a reconstructed historical state back as the live document,
    /// tagging the resulting Version with the version it restores. Unlike
    /// `save_document` this never creates a document: if the live row is
    /// gone the restore fails with a Conflict.
    pub fn save_restored(
        &self,
        document: &Document,
        restore_version_id: &str,
        author: &Author,
    ) -> Result<Option<Version>> {
        let old = self.get_document(&document.id)?.ok_or_else(|| {
            log::warn!(
                "Document {} was deleted before version {} could be restored",
                document.id,
                restore_version_id
            );
            HistoryError::Conflict(format!(
                "document {} was deleted during restore",
                document.id
            ))
        })?;
        let version = self.write_document(Some(&old), document, author, Some(restore_version_id))?;
        if let Some(version) = &version {
            self.pending_events
                .borrow_mut()
                .push(DbEvent::Restored(document.id.clone(), version.id.clone()));
        }
        Ok(version)
    }

    /// Deletes the live document. The deletion is recorded as a Version
    /// that removes every field, so versions written before it still
    /// reconstruct and a later save recreates the document from empty.
    /// Returns false if there was nothing to delete.
    pub fn delete_document(&self, id: &str, author: &Author) -> Result<bool> {
        let Some(old) = self.get_document(id)? else {
            return Ok(false);
        };

        log::debug!("SQL EXECUTE: DELETE FROM ZV_DOCUMENT WHERE id = ?");
        let affected = self.txn.execute("DELETE FROM ZV_DOCUMENT WHERE id = ?", [id])?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);

        let changes = compute_diff(&old, &Document::new(id));
        self.append_version(id, changes, author, None)?;
        self.pending_events
            .borrow_mut()
            .push(DbEvent::Deleted(id.to_string()));
        Ok(true)
    }

    fn write_document(
        &self,
        old: Option<&Document>,
        new: &Document,
        author: &Author,
        restore_version_id: Option<&str>,
    ) -> Result<Option<Version>> {
        let empty = Document::new(new.id.clone());
        let changes = compute_diff(old.unwrap_or(&empty), new);

        if changes.is_empty() {
            // An empty document still gets a row so it can be read back,
            // but there is no history to record.
            if old.is_none() {
                self.put_document(new)?;
            }
            log::debug!("No changes to document {}, nothing recorded", new.id);
            return Ok(None);
        }

        self.put_document(new)?;
        self.append_version(&new.id, changes, author, restore_version_id)
    }

    fn put_document(&self, document: &Document) -> Result<()> {
        let fields = serde_json::to_string(&document.fields)?;
        log::debug!(
            "SQL EXECUTE: INSERT INTO ZV_DOCUMENT (id, fields, updated_at) VALUES (?, ?, ?) ON CONFLICT DO UPDATE"
        );
        let affected = self.txn.execute(
            "INSERT INTO ZV_DOCUMENT (id, fields, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET fields = excluded.fields, updated_at = excluded.updated_at",
            params![&document.id, fields, now_millis()],
        )?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);
        Ok(())
    }

    pub(crate) fn take_pending_events(&self) -> Vec<DbEvent> {
        std::mem::take(&mut *self.pending_events.borrow_mut())
    }
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::db::{Author, DbEvent, Document};
    use crate::{Db, HistoryError};

    fn alice() -> Author {
        Author::new("u_alice", "Alice")
    }

    #[test]
    fn creating_a_document_records_every_field() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        let doc = Document::new("d1").with_field("title", "A").with_field("tags", json!([]));
        let version = db.save_document(&doc, &alice())?.unwrap();

        assert_eq!(version.seq, 1);
        assert_eq!(version.author_id, "u_alice");
        assert_eq!(version.author_name, "Alice");
        assert_eq!(version.changes.len(), 2);
        assert_eq!(version.changes.get("title").unwrap().before, None);
        assert_eq!(db.get_document("d1")?, Some(doc));
        Ok(())
    }

    #[test]
    fn unchanged_save_is_a_no_op() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        let doc = Document::new("d1").with_field("title", "A");
        db.save_document(&doc, &alice())?;

        let copy = Document::new("d1").with_field("title", "A");
        assert!(db.save_document(&copy, &alice())?.is_none());
        assert_eq!(db.list_versions("d1", 50)?.len(), 1);
        Ok(())
    }

    #[test]
    fn empty_new_document_has_no_history() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        assert!(db.save_document(&Document::new("blank"), &alice())?.is_none());
        assert_eq!(db.get_document("blank")?, Some(Document::new("blank")));
        assert!(db.list_versions("blank", 50)?.is_empty());
        Ok(())
    }

    #[test]
    fn restore_into_deleted_document_conflicts() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        let v1 = db
            .save_document(&Document::new("d1").with_field("title", "A"), &alice())?
            .unwrap();
        db.save_document(&Document::new("d1").with_field("title", "B"), &alice())?;

        let target = db.reconstruct_at("d1", &v1.id)?;
        assert!(db.delete_document("d1", &alice())?);

        let result = db.transaction(|txn| txn.save_restored(&target, &v1.id, &alice()));
        assert!(matches!(result, Err(HistoryError::Conflict(_))));
        assert_eq!(db.get_document("d1")?, None);
        assert_eq!(db.list_versions("d1", 50)?.len(), 3);
        Ok(())
    }

    #[test]
    fn delete_is_recorded_in_the_log() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        db.save_document(&Document::new("d1").with_field("title", "A").with_field("body", "x"), &alice())?;
        assert!(db.delete_document("d1", &alice())?);
        assert!(!db.delete_document("d1", &alice())?);

        let versions = db.list_versions("d1", 50)?;
        assert_eq!(versions.len(), 2);
        let deletion = &versions[0];
        assert_eq!(deletion.seq, 2);
        assert_eq!(deletion.changes.len(), 2);
        assert_eq!(deletion.changes.get("title").unwrap().before, Some(json!("A")));
        assert_eq!(deletion.changes.get("title").unwrap().after, None);
        assert_eq!(deletion.changes.get("body").unwrap().after, None);
        Ok(())
    }

    #[test]
    fn failed_transaction_rolls_back() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        let result: crate::Result<()> = db.transaction(|txn| {
            txn.save_document(&Document::new("d1").with_field("title", "A"), &alice())?;
            Err(HistoryError::Conflict("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.get_document("d1")?, None);
        assert!(db.list_versions("d1", 50)?.is_empty());
        Ok(())
    }

    #[test]
    fn events_are_sent_after_commit() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        let rx = db.subscribe();

        let v1 = db
            .save_document(&Document::new("d1").with_field("title", "A"), &alice())?
            .unwrap();
        db.delete_document("d1", &alice())?;

        let events: Vec<DbEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                DbEvent::Saved("d1".to_string(), v1.id),
                DbEvent::Deleted("d1".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn rolled_back_transactions_send_no_events() -> anyhow::Result<()> {
        let db = Db::open_memory()?;
        let rx = db.subscribe();
        let _ = db.transaction(|txn| -> crate::Result<()> {
            txn.save_document(&Document::new("d1").with_field("title", "A"), &alice())?;
            Err(HistoryError::Conflict("abort".to_string()))
        });
        assert!(rx.try_recv().is_err());
        Ok(())
    }
}
