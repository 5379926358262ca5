//! Remote media ingestion for the Tollway gateway
//!
//! Downloads referenced images under a byte ceiling, directly or through a
//! relay worker, and reads their format and dimensions from as little of
//! the body as possible.

#![allow(clippy::must_use_candidate)]

pub mod data_url;
mod error;
pub mod fetch;
mod inline;
pub mod sniff;

pub use data_url::{decode_base64_file, decode_base64_image};
pub use error::MediaError;
pub use fetch::{Download, Fetcher, MediaBody};
pub use sniff::{ImageInfo, sniff_image};
