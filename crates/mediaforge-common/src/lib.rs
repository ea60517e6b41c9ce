//! Mediaforge-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across mediaforge:
//!
//! - **Stream Descriptor**: the normalized record an extractor hands to the
//!   delivery engine ([`StreamDescriptor`])
//! - **Typed IDs**: [`StreamId`] for registered streams
//! - **Filename Utilities**: output filename, extension and
//!   `Content-Disposition` helpers
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use mediaforge_common::{StreamDescriptor, StreamKind};
//! use mediaforge_common::filename::content_disposition;
//!
//! let descriptor = StreamDescriptor::new("https://cdn.example/video.mp4", "clip.mp4")
//!     .with_kind(StreamKind::Remux);
//! assert_eq!(descriptor.single_url().unwrap(), "https://cdn.example/video.mp4");
//!
//! assert_eq!(content_disposition("clip.mp4"), "attachment; filename=\"clip.mp4\"");
//! ```

pub mod error;
pub mod filename;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
