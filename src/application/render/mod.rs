//! Markdown rendering.
//!
//! The pipeline is pure: it accepts a markdown body, produces deterministic
//! HTML, and surfaces structured errors. Reading and writing files happens in
//! the caller.

mod service;
mod types;

pub use service::{ComrakRenderService, render_service};
pub use types::{RenderError, RenderOutput, RenderRequest, RenderService};
