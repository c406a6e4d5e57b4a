//! Represents a logical bucket: a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket in the local blob store.
///
/// The gallery reads originals from one bucket and writes uploads to the
/// same bucket under a different prefix.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Bucket name (must conform to DNS naming rules).
    pub name: String,

    /// Region label, kept for parity with hosted stores (e.g. "eu-central-1").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
