//! Client-side upload queue types.

use bytes::Bytes;
use serde::Serialize;
use std::{fmt, sync::Arc};

/// Client-side size gate. Larger files are queued as [`UploadStatus::TooLarge`].
pub const MAX_CLIENT_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// A file picked or dropped by the user.
#[derive(Debug)]
pub struct LocalFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Shared handle to a [`LocalFile`].
///
/// Queue items are identified by the handle itself: two handles refer to the
/// same file only if they were cloned from one another.
#[derive(Clone)]
pub struct FileHandle(Arc<LocalFile>);

impl FileHandle {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self(Arc::new(LocalFile {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn mime_type(&self) -> &str {
        &self.0.mime_type
    }

    pub fn size(&self) -> u64 {
        self.0.bytes.len() as u64
    }

    pub fn bytes(&self) -> Bytes {
        self.0.bytes.clone()
    }

    /// Identity comparison.
    pub fn same_file(&self, other: &FileHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.0.name)
            .field("mime_type", &self.0.mime_type)
            .field("size", &self.0.bytes.len())
            .finish()
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
    TooLarge,
}

impl UploadStatus {
    /// Status assigned at intake for a file of `size` bytes.
    pub fn for_size(size: u64) -> Self {
        if size > MAX_CLIENT_FILE_BYTES {
            UploadStatus::TooLarge
        } else {
            UploadStatus::Pending
        }
    }

    /// No request is pending or in flight for an item in this state.
    pub fn is_settled(self) -> bool {
        !matches!(self, UploadStatus::Pending | UploadStatus::Uploading)
    }
}

/// One entry of the visible upload list.
#[derive(Clone, Debug)]
pub struct UploadItem {
    pub file: FileHandle,
    pub status: UploadStatus,
}

impl UploadItem {
    pub fn new(file: FileHandle) -> Self {
        let status = UploadStatus::for_size(file.size());
        Self { file, status }
    }
}
