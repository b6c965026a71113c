// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Session data model and the slot that gates every async continuation.

use lsp_types::Uri;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::capabilities::{Capabilities, FeatureSupport, SyncKind};

/// A live language-server session bound to one document.
///
/// Immutable once activated; a new `start()` builds a new value rather than
/// mutating this one.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    /// Transport-assigned session id.
    pub id: String,
    /// Language of the bound document.
    pub language_id: String,
    /// Workspace root sent to the server.
    pub root_uri: Option<String>,
    /// URI of the bound document.
    pub document_uri: Uri,
    /// Capabilities captured at startup.
    pub capabilities: Capabilities,
    /// Features registered for this session.
    pub features: FeatureSupport,
    /// Negotiated sync mode.
    pub sync_kind: SyncKind,
    /// Slot generation at activation. Distinguishes sessions that happen to
    /// reuse an id.
    pub generation: u64,
}

/// Snapshot of the session for status displays and the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id.
    pub session_id: String,
    /// Language id.
    pub language_id: String,
    /// Workspace root.
    pub root_uri: Option<String>,
    /// Document URI.
    pub document_uri: String,
    /// Current document version.
    pub document_version: i32,
    /// Negotiated sync mode.
    pub sync_kind: SyncKind,
    /// Registered features.
    pub features: FeatureSupport,
}

impl SessionInfo {
    pub(crate) fn new(session: &ActiveSession, document_version: i32) -> Self {
        Self {
            session_id: session.id.clone(),
            language_id: session.language_id.clone(),
            root_uri: session.root_uri.clone(),
            document_uri: session.document_uri.as_str().to_string(),
            document_version,
            sync_kind: session.sync_kind,
            features: session.features,
        }
    }
}

/// Holds the current session and the adapter's disposed flag.
///
/// Async work captures the `Arc<ActiveSession>` it was issued under and
/// asks [`SessionSlot::is_current`] after every await. Superseding,
/// clearing, or disposing all make earlier sessions non-current.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Mutex<Option<Arc<ActiveSession>>>,
    disposed: AtomicBool,
    generation: AtomicU64,
}

impl SessionSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Arc<ActiveSession>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the generation number for the next activation.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Installs `session` as current, returning whatever it replaced.
    pub fn activate(&self, session: Arc<ActiveSession>) -> Option<Arc<ActiveSession>> {
        self.lock().replace(session)
    }

    /// The current session, or `None` once disposed.
    pub fn current(&self) -> Option<Arc<ActiveSession>> {
        if self.is_disposed() {
            return None;
        }
        self.lock().clone()
    }

    /// Returns true if `session` is still the one installed and the slot is
    /// not disposed.
    pub fn is_current(&self, session: &ActiveSession) -> bool {
        self.current().is_some_and(|current| {
            current.generation == session.generation && current.id == session.id
        })
    }

    /// Removes and returns the current session.
    pub fn take(&self) -> Option<Arc<ActiveSession>> {
        self.lock().take()
    }

    /// Makes every continuation a no-op.
    pub fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    /// Clears the disposed flag so the adapter can start again.
    pub fn rearm(&self) {
        self.disposed.store(false, Ordering::SeqCst);
    }

    /// Returns true after [`SessionSlot::mark_disposed`].
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::parse_uri;
    use anyhow::Result;

    fn session(slot: &SessionSlot, id: &str) -> Result<Arc<ActiveSession>> {
        Ok(Arc::new(ActiveSession {
            id: id.to_string(),
            language_id: "typescript".to_string(),
            root_uri: None,
            document_uri: parse_uri("file:///tmp/a.ts")?,
            capabilities: Capabilities::empty(),
            features: FeatureSupport::default(),
            sync_kind: SyncKind::Full,
            generation: slot.next_generation(),
        }))
    }

    #[test]
    fn superseded_session_is_not_current() -> Result<()> {
        let slot = SessionSlot::default();
        let first = session(&slot, "s-1")?;
        let second = session(&slot, "s-2")?;

        slot.activate(first.clone());
        assert!(slot.is_current(&first));

        let replaced = slot.activate(second.clone());
        assert!(replaced.is_some_and(|old| old.id == "s-1"));
        assert!(!slot.is_current(&first));
        assert!(slot.is_current(&second));
        Ok(())
    }

    #[test]
    fn reused_id_with_new_generation_is_distinct() -> Result<()> {
        let slot = SessionSlot::default();
        let first = session(&slot, "same")?;
        let second = session(&slot, "same")?;

        slot.activate(second);
        assert!(!slot.is_current(&first));
        Ok(())
    }

    #[test]
    fn disposal_hides_session_until_rearmed() -> Result<()> {
        let slot = SessionSlot::default();
        let active = session(&slot, "s-1")?;
        slot.activate(active.clone());

        slot.mark_disposed();
        assert!(slot.current().is_none());
        assert!(!slot.is_current(&active));

        slot.rearm();
        assert!(slot.is_current(&active));
        Ok(())
    }
}
