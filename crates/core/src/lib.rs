//! `pantry-core`: shared building blocks for the pantry client crates.
//!
//! This crate holds **pure** primitives (no IO): the error model, string
//! identifiers issued by the inventory backend and the `Entity` contract the
//! view caches key on.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ActivityId, ProductId};
