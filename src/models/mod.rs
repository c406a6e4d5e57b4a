//! Core data models for the photo gallery.
//!
//! `bucket`, `object` and `metadata` map to rows of the local blob store via
//! `sqlx::FromRow`. `image` is the gallery index entry handed to page
//! renderers, and `upload` carries the client-side upload queue types.

pub mod bucket;
pub mod image;
pub mod metadata;
pub mod object;
pub mod upload;
