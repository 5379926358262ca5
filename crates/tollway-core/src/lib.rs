//! Shared types for the Tollway relay crates
//!
//! Holds the per-request relay context, the usage record that flows to
//! billing, and the error-to-HTTP seam implemented by every feature crate.

#![allow(clippy::must_use_candidate)]

mod context;
pub mod de;
mod error;
mod usage;

pub use context::{RelayInfo, RelayMode};
pub use error::HttpError;
pub use usage::Usage;
