//! User metadata attached to objects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata field name carrying the pixel width of an image.
pub const WIDTH_KEY: &str = "width";
/// Metadata field name carrying the pixel height of an image.
pub const HEIGHT_KEY: &str = "height";

/// Key-value metadata entry attached to an object (the `x-amz-meta-*`
/// equivalent of hosted stores).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectMetadata {
    pub id: Uuid,

    /// Reference to the associated object.
    pub object_id: Uuid,

    pub key: String,

    pub value: String,
}
