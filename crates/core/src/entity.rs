//! Entity trait: identity + revision across server-pushed changes.

use chrono::{DateTime, Utc};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Server-assigned revision marker (usually `updated_at`).
    ///
    /// Used for last-write-wins merging. `None` means the server did not send
    /// one, in which case the incoming copy always wins.
    fn revision(&self) -> Option<DateTime<Utc>> {
        None
    }
}
