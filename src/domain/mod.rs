//! Domain layer types and invariants.

pub mod article;
pub mod error;
pub mod front_matter;
pub mod metadata;
pub mod slug;
