use super::changes::compute_diff;
use super::core::Db;
use super::transaction::DbTransaction;
use super::types::{Author, ChangeSet, Document, Version};
use crate::error::{HistoryError, Result};

/// Rebuilds the document as it was immediately after `target_version_id`
/// was written.
///
/// `versions` must be the document's complete log, newest first. Starting
/// from `live`, every Version newer than the target is reverted in that
/// order, newest first, so a field changed by several of them ends at the
/// `before` of the oldest one. The target's own changes are kept.
pub fn replay_to(live: &Document, versions: &[Version], target_version_id: &str) -> Result<Document> {
    let position = versions
        .iter()
        .position(|v| v.id == target_version_id)
        .ok_or_else(|| HistoryError::version_not_found(&live.id, target_version_id))?;

    let mut working = live.clone();
    for version in &versions[..position] {
        version.changes.revert_onto(&mut working.fields);
    }
    Ok(working)
}

impl<'a> DbTransaction<'a> {
    /// Reconstructs the document as of `version_id`. The live document and
    /// the log are read in this transaction, so the result is consistent
    /// for a single point in time.
    pub fn reconstruct_at(&self, document_id: &str, version_id: &str) -> Result<Document> {
        let live = self.require_document(document_id)?;
        let versions = self.list_all_versions(document_id)?;
        log::debug!(
            "Reconstructing {} at {} from {} versions",
            document_id,
            version_id,
            versions.len()
        );
        replay_to(&live, &versions, version_id)
    }

    /// The change set that turns the document as of `from_version_id` into
    /// the document as of `to_version_id`.
    pub fn diff_versions(
        &self,
        document_id: &str,
        from_version_id: &str,
        to_version_id: &str,
    ) -> Result<ChangeSet> {
        let live = self.require_document(document_id)?;
        let versions = self.list_all_versions(document_id)?;
        let from = replay_to(&live, &versions, from_version_id)?;
        let to = replay_to(&live, &versions, to_version_id)?;
        Ok(compute_diff(&from, &to))
    }

    fn require_document(&self, document_id: &str) -> Result<Document> {
        self.get_document(document_id)?
            .ok_or_else(|| HistoryError::NotFound(document_id.to_string()))
    }
}

impl Db {
    /// See `DbTransaction::reconstruct_at`.
    pub fn reconstruct_at(&self, document_id: &str, version_id: &str) -> Result<Document> {
        self.transaction(|txn| txn.reconstruct_at(document_id, version_id))
    }

    pub fn diff_versions(
        &self,
        document_id: &str,
        from_version_id: &str,
        to_version_id: &str,
    ) -> Result<ChangeSet> {
        self.transaction(|txn| txn.diff_versions(document_id, from_version_id, to_version_id))
    }

    /// Restores a document to the state it had at `version_id`.
    ///
    /// The historical state is reconstructed first and then written through
    /// the normal write path in a second transaction, diffed against
    /// whatever is live at that moment. History is never rewritten: the
    /// restore is recorded as one new Version carrying `restore_version_id`.
    /// Returns None if the live document already matches the target. Fails
    /// with Conflict if the document is deleted between the two steps.
    pub fn restore(&self, document_id: &str, version_id: &str, author: &Author) -> Result<Option<Version>> {
        let target = self.reconstruct_at(document_id, version_id)?;
        let version = self.transaction(|txn| txn.save_restored(&target, version_id, author))?;
        match &version {
            Some(v) => log::info!(
                "Restored document {} to version {} as version {} (seq {})",
                document_id,
                version_id,
                v.id,
                v.seq
            ),
            None => log::info!(
                "Document {} already matches version {}, nothing to restore",
                document_id,
                version_id
            ),
        }
        Ok(version)
    }
}
