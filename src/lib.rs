//! DimpleHistory records every edit to a document as a field level diff in
//! an append-only, per-document log stored in SQLite. Any past version can
//! be reconstructed by replaying the log backward from the live document,
//! and restoring a version writes a new forward entry instead of rewriting
//! history.
//!
//! ```no_run
//! use dimple_history::{db::{Author, Document}, Db};
//!
//! # fn main() -> dimple_history::Result<()> {
//! let db = Db::open("notes.db")?;
//! let alice = Author::new("u_alice", "Alice");
//!
//! let v1 = db.save_document(&Document::new("n1").with_field("title", "Draft"), &alice)?;
//! db.save_document(&Document::new("n1").with_field("title", "Final"), &alice)?;
//!
//! if let Some(v1) = v1 {
//!     let draft = db.reconstruct_at("n1", &v1.id)?;
//!     assert_eq!(draft.get("title"), Some(&"Draft".into()));
//!     db.restore("n1", &v1.id, &alice)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod error;
mod notifier;

pub use db::Db;
pub use error::{HistoryError, Result};
pub use rusqlite;
