//! Background indexing worker for one file.
//!
//! The worker owns the chain of scheduled operations against one
//! [`LineIndex`]: each operation runs on tokio's blocking pool only after the
//! previous one has stopped, so two operations never touch the index at the
//! same time and their notifications arrive in schedule order.
//!
//! Every scheduled operation gets its own cancellation flag. `interrupt`
//! raises the flags of everything pending or running, which makes a queued
//! operation report `Interrupted` without scanning a single block.

use crate::config::IndexingConfig;
use crate::error::{LogscanError, Result};
use crate::indexing::data::LineIndex;
use crate::indexing::digest::ChangeStatus;
use crate::indexing::encoding::TextEncoding;
use crate::indexing::operation::{IndexOperation, OperationContext, OperationResult};
use log::{debug, error};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Terminal status of a scanning operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStatus {
    Successful,
    Interrupted,
    /// The file became unreadable; the index keeps its last committed blocks
    Failed,
}

/// Notifications emitted by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingEvent {
    /// Percentage done, non-decreasing within one operation
    Progress(u8),
    /// A full or partial index stopped (a cancelled check also lands here)
    Finished(LoadingStatus),
    /// A file check completed
    FileChecked(ChangeStatus),
}

impl From<OperationResult> for IndexingEvent {
    fn from(result: OperationResult) -> Self {
        match result {
            OperationResult::Completed(true) => IndexingEvent::Finished(LoadingStatus::Successful),
            OperationResult::Completed(false) => IndexingEvent::Finished(LoadingStatus::Failed),
            OperationResult::Cancelled => IndexingEvent::Finished(LoadingStatus::Interrupted),
            OperationResult::FileStatus(status) => IndexingEvent::FileChecked(status),
        }
    }
}

/// Schedules indexing operations for one file, one at a time
pub struct IndexingWorker {
    index: Arc<LineIndex>,
    config: Arc<IndexingConfig>,
    events: UnboundedSender<IndexingEvent>,
    file: Mutex<Option<PathBuf>>,

    /// Cancellation flags of operations that have not finished yet
    flags: Mutex<Vec<Weak<AtomicBool>>>,

    /// Handle of the last scheduled operation; each one awaits its predecessor
    last_scheduled: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl IndexingWorker {
    /// Create a worker writing into `index`
    ///
    /// # Returns
    /// * The worker and the receiving end of its notification channel
    ///
    /// # Errors
    /// * `ConfigError` if `config` does not validate
    pub fn new(
        index: Arc<LineIndex>,
        config: IndexingConfig,
    ) -> Result<(Self, UnboundedReceiver<IndexingEvent>)> {
        config.validate()?;
        let (events, receiver) = unbounded_channel();
        let worker = Self {
            index,
            config: Arc::new(config),
            events,
            file: Mutex::new(None),
            flags: Mutex::new(Vec::new()),
            last_scheduled: tokio::sync::Mutex::new(None),
        };
        Ok((worker, receiver))
    }

    /// The index this worker writes into
    pub fn index(&self) -> &Arc<LineIndex> {
        &self.index
    }

    /// Bind the worker to a file; no I/O happens until an operation runs
    ///
    /// A file that does not exist yet indexes as empty.
    pub fn attach(&self, path: impl AsRef<Path>) {
        *self.file.lock() = Some(path.as_ref().to_path_buf());
    }

    /// Interrupt whatever is running, wait for it to stop, then start a full index
    pub async fn index_all(&self, forced_encoding: Option<TextEncoding>) -> Result<()> {
        self.schedule(IndexOperation::FullIndex { forced_encoding }, true)
            .await
    }

    /// Queue a partial index of the bytes appended since the last scan
    pub async fn index_additional_lines(&self) -> Result<()> {
        self.schedule(IndexOperation::PartialIndex, false).await
    }

    /// Queue a cheap digest check of the file
    pub async fn check_file_changes(&self) -> Result<()> {
        self.schedule(IndexOperation::CheckFileChanges, false).await
    }

    /// Ask every pending or running operation to stop; never blocks
    pub fn interrupt(&self) {
        for flag in self.flags.lock().iter().filter_map(Weak::upgrade) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Wait until every scheduled operation has stopped
    ///
    /// Dropping the returned future early leaves the queue intact.
    pub async fn wait_for_done(&self) {
        let mut last = self.last_scheduled.lock().await;
        await_in_place(&mut last).await;
    }

    async fn schedule(&self, operation: IndexOperation, preempt: bool) -> Result<()> {
        let path = self
            .file
            .lock()
            .clone()
            .ok_or(LogscanError::NoFileAttached)?;

        let mut last = self.last_scheduled.lock().await;
        if preempt {
            self.interrupt();
            await_in_place(&mut last).await;
        }
        // No await between here and storing the new handle
        let previous = last.take();

        let interrupt = Arc::new(AtomicBool::new(false));
        {
            let mut flags = self.flags.lock();
            flags.retain(|flag| flag.strong_count() > 0);
            flags.push(Arc::downgrade(&interrupt));
        }

        debug!("scheduling {operation:?} on {}", path.display());
        let events = self.events.clone();
        let task = OperationTask {
            path,
            index: Arc::clone(&self.index),
            config: Arc::clone(&self.config),
            interrupt,
            events: self.events.clone(),
        };
        *last = Some(tokio::spawn(run_after(previous, operation, task, events)));
        Ok(())
    }
}

impl Drop for IndexingWorker {
    fn drop(&mut self) {
        self.interrupt();
    }
}

/// Everything one scheduled operation owns while it runs
struct OperationTask {
    path: PathBuf,
    index: Arc<LineIndex>,
    config: Arc<IndexingConfig>,
    interrupt: Arc<AtomicBool>,
    events: UnboundedSender<IndexingEvent>,
}

impl OperationTask {
    fn run(self, operation: IndexOperation) {
        let ctx = OperationContext {
            path: &self.path,
            index: &self.index,
            interrupt: &self.interrupt,
            config: &self.config,
        };

        let events = &self.events;
        let mut last_percent = None;
        let result = operation.run(&ctx, &mut |percent| {
            if last_percent.map_or(true, |last| percent > last) {
                last_percent = Some(percent);
                // A closed receiver just means nobody is listening any more
                let _ = events.send(IndexingEvent::Progress(percent));
            }
        });

        debug!("{operation:?} on {} -> {result:?}", self.path.display());
        let _ = self.events.send(IndexingEvent::from(result));
    }
}

/// Await the handle without taking it out of `slot`
///
/// The handle is only cleared once it has completed, so a caller dropped
/// mid-wait leaves the chain of operations unbroken.
async fn await_in_place(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.as_mut() {
        if let Err(e) = handle.await {
            error!("indexing task failed: {e}");
        }
        *slot = None;
    }
}

async fn run_after(
    previous: Option<JoinHandle<()>>,
    operation: IndexOperation,
    task: OperationTask,
    events: UnboundedSender<IndexingEvent>,
) {
    if let Some(handle) = previous {
        if let Err(e) = handle.await {
            error!("indexing task failed: {e}");
        }
    }
    if let Err(e) = tokio::task::spawn_blocking(move || task.run(operation)).await {
        error!("{operation:?} failed: {e}");
        // The task died before sending its terminal event
        let _ = events.send(IndexingEvent::Finished(LoadingStatus::Failed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_to_event() {
        assert_eq!(
            IndexingEvent::from(OperationResult::Completed(true)),
            IndexingEvent::Finished(LoadingStatus::Successful)
        );
        assert_eq!(
            IndexingEvent::from(OperationResult::Completed(false)),
            IndexingEvent::Finished(LoadingStatus::Failed)
        );
        assert_eq!(
            IndexingEvent::from(OperationResult::Cancelled),
            IndexingEvent::Finished(LoadingStatus::Interrupted)
        );
        assert_eq!(
            IndexingEvent::from(OperationResult::FileStatus(ChangeStatus::DataAdded)),
            IndexingEvent::FileChecked(ChangeStatus::DataAdded)
        );
    }

    #[tokio::test]
    async fn test_schedule_without_file_fails() {
        let (worker, _events) =
            IndexingWorker::new(Arc::new(LineIndex::new()), IndexingConfig::default()).unwrap();
        assert!(matches!(
            worker.index_all(None).await,
            Err(LogscanError::NoFileAttached)
        ));
        assert!(matches!(
            worker.check_file_changes().await,
            Err(LogscanError::NoFileAttached)
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = IndexingConfig {
            tab_width: 0,
            ..IndexingConfig::default()
        };
        assert!(matches!(
            IndexingWorker::new(Arc::new(LineIndex::new()), config),
            Err(LogscanError::ConfigError { .. })
        ));
    }
}
