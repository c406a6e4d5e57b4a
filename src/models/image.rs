//! Gallery index entries.

use crate::models::metadata::{HEIGHT_KEY, WIDTH_KEY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pixel dimensions of an original image.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
}

impl ImageMetadata {
    /// Read `width`/`height` out of an object's user metadata.
    ///
    /// Returns `None` when either field is missing or not a non-negative
    /// integer.
    pub fn from_object_metadata(fields: &HashMap<String, String>) -> Option<Self> {
        let width = fields.get(WIDTH_KEY)?.trim().parse().ok()?;
        let height = fields.get(HEIGHT_KEY)?.trim().parse().ok()?;
        Some(Self { width, height })
    }

    pub fn into_fields(self) -> HashMap<String, String> {
        HashMap::from([
            (WIDTH_KEY.to_string(), self.width.to_string()),
            (HEIGHT_KEY.to_string(), self.height.to_string()),
        ])
    }
}

/// One photo in the gallery index.
///
/// `idx` is dense and zero-based within a single index build; it is a
/// lookup parameter, not a stable identifier across builds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageEntry {
    pub idx: usize,
    pub filename: String,
    pub meta: ImageMetadata,
}
