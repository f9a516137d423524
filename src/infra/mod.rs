//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod index;
pub mod nostr;
pub mod telemetry;
