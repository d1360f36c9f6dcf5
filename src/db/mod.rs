// Re-export all public items from the db modules
pub use self::core::Db;
pub use changes::{compute_diff, compute_field_diff};
pub use reconstruct::replay_to;
pub use transaction::DbTransaction;
pub use types::*;

pub mod types;
pub mod core;
pub mod transaction;
mod changes;
mod history;
mod reconstruct;
