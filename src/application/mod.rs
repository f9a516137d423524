//! Application services: extraction, reconciliation and the derived outputs.

pub mod artifacts;
pub mod engine;
pub mod error;
pub mod extract;
pub mod feed;
pub mod publish;
pub mod reconcile;
pub mod render;
pub mod syndication;
pub mod watch;
