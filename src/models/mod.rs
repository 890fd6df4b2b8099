//! Data models for the wiki backend.
//!
//! Field names follow the wire contract used by the wiki frontend.

mod activity;
mod document;
mod metadata;
mod search;

pub use activity::*;
pub use document::*;
pub use metadata::*;
pub use search::*;
