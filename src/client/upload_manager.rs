//! Drives the upload queue.
//!
//! An actor task owns the [`UploadQueue`]. User commands and upload results
//! both arrive as messages, so every change to the list is applied in one
//! place and published on a `watch` channel for whoever renders it.

use crate::{
    client::{
        transport::UploadTransport,
        upload_queue::{QueueEvent, UploadQueue},
    },
    errors::{GalleryError, GalleryResult},
    models::upload::{FileHandle, UploadItem},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Failed items stay visible this long after their batch settles.
pub const FAILED_EVICTION_DELAY: Duration = Duration::from_millis(2500);

#[derive(Clone, Debug)]
pub struct UploaderSettings {
    pub failed_eviction_delay: Duration,
    /// Per-request limit. `None` waits for the transport indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            failed_eviction_delay: FAILED_EVICTION_DELAY,
            request_timeout: None,
        }
    }
}

enum Command {
    Add(Vec<FileHandle>),
    SubmitAll,
    Remove(usize),
}

/// Handle to a running upload queue. Cloning shares the same queue; the
/// actor stops once every handle is dropped.
#[derive(Clone)]
pub struct UploadManager {
    commands: mpsc::UnboundedSender<(Command, oneshot::Sender<()>)>,
    snapshots: watch::Receiver<Vec<UploadItem>>,
}

impl UploadManager {
    pub fn spawn(transport: Arc<dyn UploadTransport>, settings: UploaderSettings) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(Vec::new());

        let actor = QueueActor {
            queue: UploadQueue::new(),
            transport,
            settings,
            events,
            snapshots: snapshot_tx,
        };
        tokio::spawn(actor.run(command_rx, event_rx));

        Self {
            commands,
            snapshots,
        }
    }

    /// Queue files picked or dropped by the user. Nothing is sent yet.
    pub async fn add_files(&self, files: Vec<FileHandle>) -> GalleryResult<()> {
        self.send(Command::Add(files)).await
    }

    /// Start uploading every pending item. Returns once the items are
    /// marked as uploading, not when the uploads finish.
    pub async fn submit_all(&self) -> GalleryResult<()> {
        self.send(Command::SubmitAll).await
    }

    /// Drop the item at `position` from the list. An upload already in
    /// flight for it still runs to completion.
    pub async fn remove_file(&self, position: usize) -> GalleryResult<()> {
        self.send(Command::Remove(position)).await
    }

    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadItem>> {
        self.snapshots.clone()
    }

    /// Wait until no item is pending or in flight.
    pub async fn wait_until_settled(&self) -> GalleryResult<Vec<UploadItem>> {
        let mut snapshots = self.snapshots.clone();
        let items = snapshots
            .wait_for(|items| items.iter().all(|item| item.status.is_settled()))
            .await
            .map_err(|_| GalleryError::QueueClosed)?;
        Ok(items.clone())
    }

    async fn send(&self, command: Command) -> GalleryResult<()> {
        let (ack, applied) = oneshot::channel();
        self.commands
            .send((command, ack))
            .map_err(|_| GalleryError::QueueClosed)?;
        applied.await.map_err(|_| GalleryError::QueueClosed)
    }
}

struct QueueActor {
    queue: UploadQueue,
    transport: Arc<dyn UploadTransport>,
    settings: UploaderSettings,
    /// Results from upload workers and the eviction timer.
    events: mpsc::UnboundedSender<QueueEvent>,
    snapshots: watch::Sender<Vec<UploadItem>>,
}

impl QueueActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<(Command, oneshot::Sender<()>)>,
        mut events: mpsc::UnboundedReceiver<QueueEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some((command, ack)) => {
                        self.handle(command);
                        let _ = ack.send(());
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.apply(event),
            }
        }
        debug!("upload queue stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Add(files) => self.apply(QueueEvent::FilesAdded(files)),
            Command::Remove(position) => self.apply(QueueEvent::Removed(position)),
            Command::SubmitAll => self.submit_all(),
        }
    }

    fn apply(&mut self, event: QueueEvent) {
        self.queue.apply(event);
        self.snapshots.send_replace(self.queue.items().to_vec());
    }

    fn submit_all(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let files = self.queue.eligible();
        if files.is_empty() {
            return;
        }
        for file in &files {
            self.apply(QueueEvent::UploadStarted(file.clone()));
        }

        let transport = self.transport.clone();
        let events = self.events.clone();
        let settings = self.settings.clone();
        tokio::spawn(async move {
            let workers: Vec<(FileHandle, JoinHandle<()>)> = files
                .into_iter()
                .map(|file| {
                    let worker = tokio::spawn(upload_worker(
                        transport.clone(),
                        file.clone(),
                        settings.request_timeout,
                        events.clone(),
                    ));
                    (file, worker)
                })
                .collect();

            for (file, worker) in workers {
                if worker.await.is_err() {
                    let _ = events.send(QueueEvent::UploadFailed(file));
                }
            }

            tokio::time::sleep(settings.failed_eviction_delay).await;
            let _ = events.send(QueueEvent::FailedEvicted);
        });
    }
}

async fn upload_worker(
    transport: Arc<dyn UploadTransport>,
    file: FileHandle,
    timeout: Option<Duration>,
    events: mpsc::UnboundedSender<QueueEvent>,
) {
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, transport.upload(&file))
            .await
            .unwrap_or_else(|_| {
                Err(GalleryError::UploadTransport(format!(
                    "no response within {:?}",
                    limit
                )))
            }),
        None => transport.upload(&file).await,
    };

    let event = match outcome {
        Ok(()) => {
            debug!(file = file.name(), "upload finished");
            QueueEvent::UploadSucceeded(file)
        }
        Err(err) => {
            warn!(file = file.name(), error = %err, "upload failed");
            QueueEvent::UploadFailed(file)
        }
    };
    // The queue may already be gone; the result has nowhere to go then.
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::{MAX_CLIENT_FILE_BYTES, UploadStatus};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::{collections::HashMap, sync::Mutex};

    /// Answers each filename after a delay, succeeding unless listed as failing.
    #[derive(Default)]
    struct ScriptedTransport {
        delays: HashMap<String, Duration>,
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn delay(mut self, name: &str, millis: u64) -> Self {
            self.delays
                .insert(name.to_string(), Duration::from_millis(millis));
            self
        }

        fn fail(mut self, name: &str) -> Self {
            self.failing.push(name.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn upload(&self, file: &FileHandle) -> GalleryResult<()> {
            self.calls.lock().unwrap().push(file.name().to_string());
            let delay = self.delays.get(file.name()).copied().unwrap_or_default();
            tokio::time::sleep(delay).await;
            if self.failing.iter().any(|n| n == file.name()) {
                Err(GalleryError::UploadTransport("500 Internal Server Error".into()))
            } else {
                Ok(())
            }
        }
    }

    fn file(name: &str) -> FileHandle {
        FileHandle::new(name, "image/jpeg", Bytes::from_static(b"jpeg"))
    }

    fn big(name: &str) -> FileHandle {
        FileHandle::new(
            name,
            "image/jpeg",
            Bytes::from(vec![0u8; MAX_CLIENT_FILE_BYTES as usize + 1]),
        )
    }

    fn statuses(items: &[UploadItem]) -> Vec<(String, UploadStatus)> {
        items
            .iter()
            .map(|item| (item.file.name().to_string(), item.status))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_independent_and_evicted_after_the_delay() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .delay("a.jpg", 300)
                .delay("b.jpg", 50)
                .fail("b.jpg")
                .delay("c.jpg", 10)
                .fail("d.jpg"),
        );
        let manager = UploadManager::spawn(transport.clone(), UploaderSettings::default());

        manager
            .add_files(vec![file("a.jpg"), file("b.jpg"), big("big.jpg")])
            .await
            .unwrap();
        manager
            .add_files(vec![file("c.jpg"), file("d.jpg")])
            .await
            .unwrap();
        manager.submit_all().await.unwrap();

        let uploading = statuses(&manager.snapshot());
        assert_eq!(uploading[0].1, UploadStatus::Uploading);
        assert_eq!(uploading[2].1, UploadStatus::TooLarge);

        let settled = manager.wait_until_settled().await.unwrap();
        assert_eq!(
            statuses(&settled),
            vec![
                ("a.jpg".to_string(), UploadStatus::Uploaded),
                ("b.jpg".to_string(), UploadStatus::Failed),
                ("big.jpg".to_string(), UploadStatus::TooLarge),
                ("c.jpg".to_string(), UploadStatus::Uploaded),
                ("d.jpg".to_string(), UploadStatus::Failed),
            ]
        );
        assert!(!transport.calls().contains(&"big.jpg".to_string()));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(manager.snapshot().len(), 5);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(
            statuses(&manager.snapshot()),
            vec![
                ("a.jpg".to_string(), UploadStatus::Uploaded),
                ("big.jpg".to_string(), UploadStatus::TooLarge),
                ("c.jpg".to_string(), UploadStatus::Uploaded),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removing_an_in_flight_item_does_not_cancel_it() {
        let transport = Arc::new(ScriptedTransport::default().delay("a.jpg", 100));
        let manager = UploadManager::spawn(transport.clone(), UploaderSettings::default());

        manager
            .add_files(vec![file("a.jpg"), file("b.jpg")])
            .await
            .unwrap();
        manager.submit_all().await.unwrap();
        manager.remove_file(0).await.unwrap();

        let settled = manager.wait_until_settled().await.unwrap();
        assert_eq!(
            statuses(&settled),
            vec![("b.jpg".to_string(), UploadStatus::Uploaded)]
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.snapshot().len(), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_each_applied_command() {
        let transport = Arc::new(ScriptedTransport::default().delay("a.jpg", 100));
        let manager = UploadManager::spawn(transport, UploaderSettings::default());
        let mut updates = manager.subscribe();

        manager.add_files(vec![file("a.jpg")]).await.unwrap();
        assert!(updates.has_changed().unwrap());
        assert_eq!(
            statuses(&updates.borrow_and_update()),
            vec![("a.jpg".to_string(), UploadStatus::Pending)]
        );

        manager.submit_all().await.unwrap();
        assert_eq!(
            statuses(&updates.borrow_and_update()),
            vec![("a.jpg".to_string(), UploadStatus::Uploading)]
        );

        updates.changed().await.unwrap();
        assert_eq!(
            statuses(&updates.borrow_and_update()),
            vec![("a.jpg".to_string(), UploadStatus::Uploaded)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn submit_on_an_empty_queue_sends_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let manager = UploadManager::spawn(transport.clone(), UploaderSettings::default());

        manager.submit_all().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(manager.snapshot().is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settled_items_are_not_resubmitted() {
        let transport = Arc::new(ScriptedTransport::default().fail("b.jpg"));
        let manager = UploadManager::spawn(transport.clone(), UploaderSettings::default());

        manager
            .add_files(vec![file("a.jpg"), file("b.jpg")])
            .await
            .unwrap();
        manager.submit_all().await.unwrap();
        manager.wait_until_settled().await.unwrap();

        manager.add_files(vec![file("c.jpg")]).await.unwrap();
        manager.submit_all().await.unwrap();
        manager.wait_until_settled().await.unwrap();

        assert_eq!(transport.calls(), vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_marks_the_item_failed() {
        let transport = Arc::new(ScriptedTransport::default().delay("slow.jpg", 60_000));
        let settings = UploaderSettings {
            request_timeout: Some(Duration::from_secs(1)),
            ..UploaderSettings::default()
        };
        let manager = UploadManager::spawn(transport, settings);

        manager.add_files(vec![file("slow.jpg")]).await.unwrap();
        manager.submit_all().await.unwrap();

        let settled = manager.wait_until_settled().await.unwrap();
        assert_eq!(settled[0].status, UploadStatus::Failed);
    }
}
