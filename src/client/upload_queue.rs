//! The visible upload list and its transition function.
//!
//! Every change to the list goes through [`UploadQueue::apply`]. Status
//! transitions find their items by file identity, so removing an item
//! while its upload is in flight never redirects the result to a neighbour.

use crate::models::upload::{FileHandle, UploadItem, UploadStatus};

#[derive(Clone, Debug)]
pub enum QueueEvent {
    /// Append files in the given order. Duplicates are kept.
    FilesAdded(Vec<FileHandle>),
    UploadStarted(FileHandle),
    UploadSucceeded(FileHandle),
    UploadFailed(FileHandle),
    /// User removed the item at this position of the visible list.
    Removed(usize),
    /// Delayed cleanup after a batch settled.
    FailedEvicted,
}

#[derive(Clone, Debug, Default)]
pub struct UploadQueue {
    items: Vec<UploadItem>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Files a submit would send: every `Pending` item, in list order.
    pub fn eligible(&self) -> Vec<FileHandle> {
        self.items
            .iter()
            .filter(|item| item.status == UploadStatus::Pending)
            .map(|item| item.file.clone())
            .collect()
    }

    /// True while any item is still waiting or in flight.
    pub fn has_unsettled(&self) -> bool {
        self.items.iter().any(|item| !item.status.is_settled())
    }

    pub fn apply(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::FilesAdded(files) => {
                self.items.extend(files.into_iter().map(UploadItem::new));
            }
            QueueEvent::UploadStarted(file) => {
                self.transition(&file, UploadStatus::Pending, UploadStatus::Uploading)
            }
            QueueEvent::UploadSucceeded(file) => {
                self.transition(&file, UploadStatus::Uploading, UploadStatus::Uploaded)
            }
            QueueEvent::UploadFailed(file) => {
                self.transition(&file, UploadStatus::Uploading, UploadStatus::Failed)
            }
            QueueEvent::Removed(position) => {
                if position < self.items.len() {
                    self.items.remove(position);
                }
            }
            QueueEvent::FailedEvicted => {
                self.items.retain(|item| item.status != UploadStatus::Failed);
            }
        }
    }

    /// Move every item of `file` that is in `from` to `to`, in place.
    ///
    /// Items in any other state are untouched: a `TooLarge` item can never
    /// start, and a result for a removed item changes nothing.
    fn transition(&mut self, file: &FileHandle, from: UploadStatus, to: UploadStatus) {
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.file.same_file(file) && item.status == from)
        {
            item.status = to;
        }
    }
}
