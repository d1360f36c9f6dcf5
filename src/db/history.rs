use rusqlite::{params, Params};
use uuid::Uuid;

use super::transaction::{now_millis, DbTransaction};
use super::types::{Author, ChangeSet, Version, VersionRecord};
use crate::error::Result;

const VERSION_COLUMNS: &str = "id, document_id, seq, author_id, author_name, created_at, changes, is_snapshot, restore_version_id";

impl<'a> DbTransaction<'a> {
    /// Appends one Version to the document's log.
    ///
    /// The new Version gets the next `seq` for the document and a
    /// `created_at` strictly greater than the previous Version's, even if
    /// the wall clock went backwards. An empty change set is refused and
    /// nothing is written.
    pub fn append_version(
        &self,
        document_id: &str,
        changes: ChangeSet,
        author: &Author,
        restore_version_id: Option<&str>,
    ) -> Result<Option<Version>> {
        if changes.is_empty() {
            log::debug!("Refusing to append an empty change set to {}", document_id);
            return Ok(None);
        }

        let (last_seq, last_created_at): (i64, i64) = self.txn().query_row(
            "SELECT COALESCE(MAX(seq), 0), COALESCE(MAX(created_at), 0)
             FROM ZV_VERSION WHERE document_id = ?",
            [document_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let version = Version {
            id: Uuid::now_v7().to_string(),
            document_id: document_id.to_string(),
            seq: last_seq + 1,
            author_id: author.id.clone(),
            author_name: author.name.clone(),
            created_at: now_millis().max(last_created_at + 1),
            changes,
            is_snapshot: false,
            restore_version_id: restore_version_id.map(str::to_string),
        };

        log::debug!("SQL EXECUTE: INSERT INTO ZV_VERSION ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)", VERSION_COLUMNS);
        let affected = self.txn().execute(
            &format!(
                "INSERT INTO ZV_VERSION ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                VERSION_COLUMNS
            ),
            params![
                &version.id,
                &version.document_id,
                version.seq,
                &version.author_id,
                &version.author_name,
                version.created_at,
                serde_json::to_string(&version.changes)?,
                version.is_snapshot,
                &version.restore_version_id,
            ],
        )?;
        log::debug!("SQL EXECUTE RESULT: {} rows affected", affected);

        Ok(Some(version))
    }

    /// Lists a document's versions newest first, capped at `limit`, which
    /// is itself capped at the configured `max_list_limit`.
    pub fn list_versions(&self, document_id: &str, limit: usize) -> Result<Vec<Version>> {
        let limit = i64::try_from(limit.min(self.db().config().max_list_limit)).unwrap_or(i64::MAX);
        self.query_versions(
            &format!(
                "SELECT {} FROM ZV_VERSION WHERE document_id = ? ORDER BY seq DESC LIMIT ?",
                VERSION_COLUMNS
            ),
            params![document_id, limit],
        )
    }

    /// The complete log, newest first. Reconstruction needs every Version
    /// between now and the target, so this is never capped.
    pub fn list_all_versions(&self, document_id: &str) -> Result<Vec<Version>> {
        self.query_versions(
            &format!(
                "SELECT {} FROM ZV_VERSION WHERE document_id = ? ORDER BY seq DESC",
                VERSION_COLUMNS
            ),
            [document_id],
        )
    }

    pub fn get_version(&self, version_id: &str) -> Result<Option<Version>> {
        Ok(self
            .query_versions(
                &format!("SELECT {} FROM ZV_VERSION WHERE id = ? LIMIT 1", VERSION_COLUMNS),
                [version_id],
            )?
            .into_iter()
            .next())
    }

    fn query_versions<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Version>> {
        let mut stmt = self.txn().prepare(sql)?;
        let records = serde_rusqlite::from_rows::<VersionRecord>(stmt.query(params)?)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        records.into_iter().map(VersionRecord::into_version).collect()
    }
}
