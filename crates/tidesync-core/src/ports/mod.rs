//! Port definitions (trait interfaces implemented by adapter crates)

pub mod journal_store;
pub mod remote_store;

pub use journal_store::JournalStore;
pub use remote_store::{PutResult, RemoteEntry, RemoteError, RemoteStore};
