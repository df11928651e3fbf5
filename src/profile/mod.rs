//! Durable personality profile storage.
//!
//! A profile is a map from canonical trait key to [`TraitRecord`], owned
//! exclusively by its [`ProfileStore`]. Mutation happens only through the
//! store's write gate (one batch application in flight per profile);
//! everything else reads immutable [`ProfileSnapshot`]s.

pub mod record;
pub mod registry;
pub mod store;

pub use record::{HistoryPoint, TraitRecord};
pub use registry::ProfileRegistry;
pub use store::{ApplyGuard, ProfileSnapshot, ProfileState, ProfileStore};
