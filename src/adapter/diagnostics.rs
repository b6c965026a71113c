// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Projection of pushed diagnostics onto editor markers.

use lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Uri};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

use super::session::SessionSlot;
use super::sync::DocumentSynchronizer;
use crate::editor::{EditorHost, EditorRange, Marker, MarkerSeverity};
use crate::transport::DiagnosticsBatch;

/// Marker owner used for every marker the adapter writes.
pub const MARKER_OWNER: &str = "lsp";

/// Filters diagnostics batches and writes markers.
pub struct DiagnosticsProjector {
    slot: Arc<SessionSlot>,
    synchronizer: Arc<DocumentSynchronizer>,
    host: Arc<dyn EditorHost>,
    /// Held across the currency check and the marker write so a concurrent
    /// `clear` always lands after an in-flight batch.
    writes: Mutex<()>,
}

impl DiagnosticsProjector {
    pub(crate) fn new(
        slot: Arc<SessionSlot>,
        synchronizer: Arc<DocumentSynchronizer>,
        host: Arc<dyn EditorHost>,
    ) -> Self {
        Self {
            slot,
            synchronizer,
            host,
            writes: Mutex::new(()),
        }
    }

    /// Applies `batch` if it belongs to the current session and document
    /// and is not older than the current document version. Returns whether
    /// markers were written.
    pub fn accept(&self, batch: &DiagnosticsBatch) -> bool {
        let Some(session) = self.slot.current() else {
            return false;
        };
        if batch.session_id != session.id || batch.uri != session.document_uri {
            trace!(
                "Ignoring diagnostics for {} ({})",
                batch.uri.as_str(),
                batch.session_id
            );
            return false;
        }

        let current = self.synchronizer.version();
        if let Some(version) = batch.version
            && version < current
        {
            trace!("Dropping stale diagnostics v{} (current v{})", version, current);
            return false;
        }

        let markers = batch.diagnostics.iter().map(to_marker).collect();
        let _write = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.slot.is_current(&session) {
            return false;
        }
        self.host
            .set_markers(&session.document_uri, MARKER_OWNER, markers);
        true
    }

    /// Removes every adapter marker from `uri`.
    pub fn clear(&self, uri: &Uri) {
        let _write = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        self.host.set_markers(uri, MARKER_OWNER, Vec::new());
    }
}

/// Maps a protocol severity onto the editor's ordinal table.
///
/// A missing severity is treated as an error, matching what servers mean
/// when they omit it.
#[must_use]
pub fn marker_severity(severity: Option<DiagnosticSeverity>) -> MarkerSeverity {
    match severity {
        None | Some(DiagnosticSeverity::ERROR) => MarkerSeverity::Error,
        Some(DiagnosticSeverity::WARNING) => MarkerSeverity::Warning,
        Some(DiagnosticSeverity::HINT) => MarkerSeverity::Hint,
        Some(_) => MarkerSeverity::Info,
    }
}

/// Converts one diagnostic into an editor marker.
#[must_use]
pub fn to_marker(diagnostic: &Diagnostic) -> Marker {
    Marker {
        severity: marker_severity(diagnostic.severity),
        message: diagnostic.message.clone(),
        source: diagnostic.source.clone(),
        code: diagnostic.code.as_ref().map(|code| match code {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s.clone(),
        }),
        range: EditorRange::from_lsp(&diagnostic.range),
    }
}
