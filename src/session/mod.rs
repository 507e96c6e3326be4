//! Session trust cache and the external session-store seam.

mod cache;
mod store;

pub use cache::{TrustCache, TrustEntry, spawn_sweeper};
pub use store::{InMemorySessionStore, PgSessionStore, SessionStore, SessionStoreError};
