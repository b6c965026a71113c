// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Ordered document synchronisation.
//!
//! Buffer changes are versioned synchronously and handed to a single worker
//! task per session, which issues `change_document` calls one at a time in
//! submission order. Incremental patches do not commute, so a later patch
//! must never reach the server before an earlier one.

use lsp_types::{TextDocumentContentChangeEvent, VersionedTextDocumentIdentifier};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use super::capabilities::SyncKind;
use super::session::{ActiveSession, SessionSlot};
use super::status::{AdapterStatus, StatusReporter};
use crate::editor::BufferChange;
use crate::error::AdapterError;
use crate::transport::Transport;

/// Version of a freshly opened document.
pub const INITIAL_VERSION: i32 = 1;

struct SyncTask {
    version: i32,
    full_text: String,
    content_changes: Option<Vec<TextDocumentContentChangeEvent>>,
}

enum SyncMessage {
    Change(SyncTask),
    Flush(oneshot::Sender<()>),
}

struct SyncQueue {
    session: Arc<ActiveSession>,
    sender: mpsc::UnboundedSender<SyncMessage>,
}

/// Owns the document version and the per-session sync queue.
pub struct DocumentSynchronizer {
    version: AtomicI32,
    queue: Mutex<Option<SyncQueue>>,
    slot: Arc<SessionSlot>,
    transport: Arc<dyn Transport>,
    status: StatusReporter,
}

impl DocumentSynchronizer {
    pub(crate) fn new(
        slot: Arc<SessionSlot>,
        transport: Arc<dyn Transport>,
        status: StatusReporter,
    ) -> Self {
        Self {
            version: AtomicI32::new(INITIAL_VERSION),
            queue: Mutex::new(None),
            slot,
            transport,
            status,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<SyncQueue>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a fresh queue for `session` and resets the version.
    ///
    /// Must be called from within a tokio runtime. A queue left over from
    /// an earlier session drains as no-ops.
    pub fn begin(&self, session: Arc<ActiveSession>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut queue = self.lock();
        self.version.store(INITIAL_VERSION, Ordering::SeqCst);

        tokio::spawn(run_sync_worker(
            session.clone(),
            self.slot.clone(),
            self.transport.clone(),
            self.status.clone(),
            receiver,
        ));

        *queue = Some(SyncQueue { session, sender });
    }

    /// Records one buffer change event and queues its sync call.
    ///
    /// Never blocks. Does nothing once disposed or without a session.
    pub fn on_buffer_changed(&self, full_text: &str, changes: &[BufferChange]) {
        if self.slot.is_disposed() {
            return;
        }

        let queue = self.lock();
        let Some(queue) = queue.as_ref() else {
            return;
        };
        if !self.slot.is_current(&queue.session) {
            return;
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let content_changes = match queue.session.sync_kind {
            SyncKind::Incremental => Some(
                changes
                    .iter()
                    .map(BufferChange::to_content_change)
                    .collect(),
            ),
            SyncKind::Full => None,
        };

        trace!(
            "Queueing sync for {} v{}",
            queue.session.document_uri.as_str(),
            version
        );
        let task = SyncTask {
            version,
            full_text: full_text.to_string(),
            content_changes,
        };
        if queue.sender.send(SyncMessage::Change(task)).is_err() {
            debug!("Sync worker for session {} has stopped", queue.session.id);
        }
    }

    /// Waits until every change queued so far has been processed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        let queued = self
            .lock()
            .as_ref()
            .is_some_and(|queue| queue.sender.send(SyncMessage::Flush(done)).is_ok());
        if queued {
            wait.await.ok();
        }
    }

    /// Current document version.
    pub fn version(&self) -> i32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Drops the queue and resets the version.
    pub fn reset(&self) {
        self.lock().take();
        self.version.store(INITIAL_VERSION, Ordering::SeqCst);
    }
}

async fn run_sync_worker(
    session: Arc<ActiveSession>,
    slot: Arc<SessionSlot>,
    transport: Arc<dyn Transport>,
    status: StatusReporter,
    mut receiver: mpsc::UnboundedReceiver<SyncMessage>,
) {
    while let Some(message) = receiver.recv().await {
        let task = match message {
            SyncMessage::Flush(done) => {
                done.send(()).ok();
                continue;
            }
            SyncMessage::Change(task) => task,
        };

        if !slot.is_current(&session) {
            trace!("Skipping sync v{} for inactive session", task.version);
            continue;
        }

        let document =
            VersionedTextDocumentIdentifier::new(session.document_uri.clone(), task.version);
        if let Err(e) = transport
            .change_document(
                &session.id,
                document,
                &task.full_text,
                task.content_changes,
            )
            .await
        {
            let error = AdapterError::DocumentSync(format!("{e:#}"));
            warn!("{} (v{})", error, task.version);
            if slot.is_current(&session) {
                status.report(AdapterStatus::Fallback, Some(&error.to_string()));
            }
        }
    }
    trace!("Sync worker for session {} finished", session.id);
}
