use std::sync::{mpsc::Receiver, Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use rusqlite_migration::{Migrations, M};

use crate::db::transaction::DbTransaction;
use crate::db::types::{Author, DbEvent, Document, Entity, HistoryConfig, Version};
use crate::error::{HistoryError, Result};
use crate::notifier::Notifier;

/// ZV is used as a prefix for the internal tables. Z puts them at the end
/// of alphabetical lists and V differentiates them from Core Data tables.
///
/// ZV_VERSION has no foreign key to ZV_DOCUMENT: the log outlives a
/// deleted document.
const SCHEMA: &str = "
    CREATE TABLE ZV_DOCUMENT (
        id TEXT NOT NULL PRIMARY KEY,
        fields TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE ZV_VERSION (
        id TEXT NOT NULL PRIMARY KEY,
        document_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        changes TEXT NOT NULL,
        is_snapshot BOOL NOT NULL DEFAULT FALSE,
        restore_version_id TEXT,
        UNIQUE (document_id, seq)
    );
";

/// Handle to a history database. Cheap to clone; clones share the same
/// connection and subscribers.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    config: HistoryConfig,
    notifier: Notifier<DbEvent>,
}

impl Db {
    pub fn open_memory() -> Result<Self> {
        Self::open_memory_with_config(HistoryConfig::default())
    }

    pub fn open_memory_with_config(config: HistoryConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, HistoryConfig::default())
    }

    pub fn open_with_config<P: AsRef<std::path::Path>>(path: P, config: HistoryConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Subscribe to be notified of every committed save, restore and
    /// delete. Dropped Receivers are lazily cleaned up.
    pub fn subscribe(&self) -> Receiver<DbEvent> {
        self.notifier.observer()
    }

    /// Calls the supplied closure with a database transaction. Commits
    /// automatically if the closure returns Ok, otherwise rolls back.
    /// Subscribers are notified only after a successful commit.
    ///
    /// Transactions take the write lock up front so that two writers on
    /// the same file never compute the same next `seq`.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DbTransaction) -> Result<R>,
    {
        let (result, events) = {
            let mut conn = self
                .conn
                .lock()
                .map_err(|_| HistoryError::lock_poisoned("connection"))?;
            let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let db_txn = DbTransaction::new(self, &txn);
            let result = f(&db_txn)?;
            let events = db_txn.take_pending_events();
            drop(db_txn);
            txn.commit()?;
            (result, events)
        };

        for event in events {
            self.notifier.notify(event);
        }
        Ok(result)
    }

    /// Shortcut to read the live document. See DbTransaction.get_document()
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.transaction(|txn| txn.get_document(id))
    }

    /// Shortcut to create a transaction and save a single document.
    /// See DbTransaction.save_document()
    pub fn save_document(&self, document: &Document, author: &Author) -> Result<Option<Version>> {
        self.transaction(|txn| txn.save_document(document, author))
    }

    /// Shortcut to save a typed entity. See DbTransaction.save()
    pub fn save<E: Entity>(&self, id: &str, entity: &E, author: &Author) -> Result<Option<Version>> {
        self.transaction(|txn| txn.save(id, entity, author))
    }

    /// Reads the live document as a typed entity.
    pub fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        self.get_document(id)?.map(|doc| doc.to_entity()).transpose()
    }

    /// Shortcut to delete a document. See DbTransaction.delete_document()
    pub fn delete_document(&self, id: &str, author: &Author) -> Result<bool> {
        self.transaction(|txn| txn.delete_document(id, author))
    }

    /// Newest first, capped at `limit` and at `HistoryConfig::max_list_limit`.
    pub fn list_versions(&self, document_id: &str, limit: usize) -> Result<Vec<Version>> {
        self.transaction(|txn| txn.list_versions(document_id, limit))
    }

    pub fn get_version(&self, version_id: &str) -> Result<Option<Version>> {
        self.transaction(|txn| txn.get_version(version_id))
    }

    fn from_connection(mut conn: Connection, config: HistoryConfig) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        Migrations::new(vec![M::up(SCHEMA)]).to_latest(&mut conn)?;

        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
            config,
            notifier: Notifier::new(),
        })
    }
}
