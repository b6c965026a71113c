// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The session controller.
//!
//! [`LspAdapter`] binds one buffer model to one language-server session.
//! It owns every registration it makes and releases them in order on
//! [`LspAdapter::dispose`].

use anyhow::{Context, Result, anyhow};
use lsp_types::{TextDocumentIdentifier, TextDocumentItem};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::capabilities::{
    Capabilities, FeatureSupport, resolve_feature_support, resolve_sync_kind,
};
use super::diagnostics::DiagnosticsProjector;
use super::features::{FeatureProviders, register_features};
use super::request::RequestLifecycle;
use super::session::{ActiveSession, SessionInfo, SessionSlot};
use super::status::{AdapterStatus, StatusReporter};
use super::sync::{DocumentSynchronizer, INITIAL_VERSION};
use crate::config::AdapterOptions;
use crate::disposable::Disposable;
use crate::editor::{BufferChange, BufferChangeEvent, BufferModel, EditorHost};
use crate::error::AdapterError;
use crate::transport::{DiagnosticsBatch, Transport};

/// Result of [`LspAdapter::start`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    /// Whether a session is live.
    pub connected: bool,
    /// Server capabilities, empty when not connected.
    pub capabilities: Capabilities,
    /// Registered features, all false when not connected.
    pub features: FeatureSupport,
}

impl StartOutcome {
    fn disconnected() -> Self {
        Self {
            connected: false,
            capabilities: Capabilities::empty(),
            features: FeatureSupport::default(),
        }
    }
}

/// Binds an editor buffer to a language-server session.
pub struct LspAdapter {
    options: AdapterOptions,
    transport: Arc<dyn Transport>,
    host: Arc<dyn EditorHost>,
    model: Option<Arc<dyn BufferModel>>,
    slot: Arc<SessionSlot>,
    status: StatusReporter,
    synchronizer: Arc<DocumentSynchronizer>,
    lifecycle: Arc<RequestLifecycle>,
    providers: Arc<FeatureProviders>,
    projector: Arc<DiagnosticsProjector>,
    registrations: Mutex<Vec<Disposable>>,
}

impl LspAdapter {
    /// Creates an adapter. Nothing talks to the transport until
    /// [`LspAdapter::start`].
    pub fn new(
        options: AdapterOptions,
        transport: Arc<dyn Transport>,
        host: Arc<dyn EditorHost>,
        model: Option<Arc<dyn BufferModel>>,
    ) -> Self {
        let slot = Arc::new(SessionSlot::default());
        let status = StatusReporter::new(options.on_status_change.clone());
        let synchronizer = Arc::new(DocumentSynchronizer::new(
            slot.clone(),
            transport.clone(),
            status.clone(),
        ));
        let lifecycle = Arc::new(RequestLifecycle::new(slot.clone(), transport.clone()));
        let providers = Arc::new(FeatureProviders::new(
            lifecycle.clone(),
            slot.clone(),
            transport.clone(),
        ));
        let projector = Arc::new(DiagnosticsProjector::new(
            slot.clone(),
            synchronizer.clone(),
            host.clone(),
        ));

        Self {
            options,
            transport,
            host,
            model,
            slot,
            status,
            synchronizer,
            lifecycle,
            providers,
            projector,
            registrations: Mutex::new(Vec::new()),
        }
    }

    fn registrations(&self) -> MutexGuard<'_, Vec<Disposable>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, handle: Disposable) {
        self.registrations().push(handle);
    }

    /// Starts a session and wires the editor to it.
    ///
    /// Never fails: every problem is reported as a `fallback` status and a
    /// disconnected outcome. Calling this on a live adapter tears the old
    /// session down first; calling it after [`LspAdapter::dispose`] starts
    /// afresh.
    pub async fn start(&self) -> StartOutcome {
        if self.slot.current().is_some() {
            debug!("Superseding the current session");
            self.dispose().await;
        }
        self.slot.rearm();

        if !self.transport.is_available() {
            return self.precondition_failed(&AdapterError::EnvironmentUnavailable);
        }
        let Some(model) = self.model.clone() else {
            return self.precondition_failed(&AdapterError::ModelUnavailable);
        };

        self.status.report(AdapterStatus::Starting, None);

        match self.connect(&model).await {
            Ok(session) => {
                info!(
                    "Connected session {} for {} ({:?} sync)",
                    session.id, session.language_id, session.sync_kind
                );
                self.status.report(AdapterStatus::Connected, None);
                StartOutcome {
                    connected: true,
                    capabilities: session.capabilities.clone(),
                    features: session.features,
                }
            }
            Err(e) => {
                let error = AdapterError::startup(&e);
                warn!("LSP startup failed: {}", error);
                self.status
                    .report(AdapterStatus::Fallback, Some(&error.to_string()));
                StartOutcome::disconnected()
            }
        }
    }

    fn precondition_failed(&self, error: &AdapterError) -> StartOutcome {
        debug!("LSP unavailable: {}", error);
        self.status
            .report(AdapterStatus::Fallback, Some(&error.to_string()));
        StartOutcome::disconnected()
    }

    async fn connect(&self, model: &Arc<dyn BufferModel>) -> Result<Arc<ActiveSession>> {
        let root_uri = self.options.resolved_root_uri();
        let started = self
            .transport
            .start_session(
                &self.options.language_id,
                root_uri.as_deref(),
                self.options.launch.as_ref(),
            )
            .await?;

        if self.slot.is_disposed() {
            self.shutdown_quietly(&started.session_id).await;
            return Err(anyhow!("Adapter was disposed during startup"));
        }

        let features = resolve_feature_support(&started.capabilities)
            .gated(self.options.extended_features_enabled);
        let sync_kind =
            resolve_sync_kind(&started.capabilities, self.options.protocol_v2_enabled);

        let session = Arc::new(ActiveSession {
            id: started.session_id,
            language_id: self.options.language_id.clone(),
            root_uri,
            document_uri: model.uri(),
            capabilities: started.capabilities,
            features,
            sync_kind,
            generation: self.slot.next_generation(),
        });
        self.slot.activate(session.clone());
        self.synchronizer.begin(session.clone());

        if let Err(e) = self.wire(&session, model).await {
            self.abort_startup(&session).await;
            return Err(e);
        }
        Ok(session)
    }

    async fn wire(&self, session: &Arc<ActiveSession>, model: &Arc<dyn BufferModel>) -> Result<()> {
        let command_id = format!("lsp.{}.executeCommand", session.id);
        self.register(
            self.host
                .register_command(&command_id, self.providers.clone()),
        );

        let document = TextDocumentItem::new(
            session.document_uri.clone(),
            session.language_id.clone(),
            INITIAL_VERSION,
            model.text(),
        );
        self.transport
            .open_document(&session.id, document)
            .await
            .context("Failed to open document")?;

        if !self.slot.is_current(session) {
            return Err(anyhow!("Session ended during startup"));
        }

        let synchronizer = self.synchronizer.clone();
        let weak_model = Arc::downgrade(model);
        self.register(model.on_did_change(Arc::new(move |event: &BufferChangeEvent| {
            if let Some(model) = weak_model.upgrade() {
                synchronizer.on_buffer_changed(&model.text(), &event.changes);
            }
        })));

        let handles = register_features(
            self.host.as_ref(),
            &session.language_id,
            &session.features,
            &self.providers,
        );
        self.registrations().extend(handles);

        let projector = self.projector.clone();
        self.register(self.transport.listen_diagnostics(Arc::new(move |batch: DiagnosticsBatch| {
            projector.accept(&batch);
        })));

        Ok(())
    }

    /// Undoes a half-finished startup.
    async fn abort_startup(&self, session: &ActiveSession) {
        self.release_registrations();
        if self.slot.is_current(session) {
            self.slot.take();
        }
        self.synchronizer.reset();
        self.lifecycle.reset();
        self.shutdown_quietly(&session.id).await;
    }

    async fn shutdown_quietly(&self, session_id: &str) {
        if let Err(e) = self.transport.shutdown_session(session_id).await {
            warn!(
                "{}",
                AdapterError::Teardown {
                    step: "shutdownSession",
                    message: format!("{e:#}"),
                }
            );
        }
    }

    fn release_registrations(&self) {
        let registrations = std::mem::take(&mut *self.registrations());
        debug!("Releasing {} registrations", registrations.len());
        for registration in registrations {
            registration.dispose();
        }
    }

    /// Tears the adapter down.
    ///
    /// Releases registrations in the order they were made, clears markers,
    /// then closes the document and shuts the session down. Transport
    /// failures are logged and swallowed. Safe to call repeatedly.
    pub async fn dispose(&self) {
        self.slot.mark_disposed();
        self.release_registrations();

        let session = self.slot.take();
        let marker_uri = session
            .as_ref()
            .map(|s| s.document_uri.clone())
            .or_else(|| self.model.as_ref().map(|m| m.uri()));
        if let Some(uri) = marker_uri {
            self.projector.clear(&uri);
        }

        if let Some(session) = session {
            let document = TextDocumentIdentifier::new(session.document_uri.clone());
            if let Err(e) = self.transport.close_document(&session.id, document).await {
                warn!(
                    "{}",
                    AdapterError::Teardown {
                        step: "closeDocument",
                        message: format!("{e:#}"),
                    }
                );
            }
            self.shutdown_quietly(&session.id).await;
            debug!("Session {} disposed", session.id);
        }

        self.synchronizer.reset();
        self.lifecycle.reset();
    }

    /// Feeds a buffer change directly, for editors that do not use
    /// [`BufferModel::on_did_change`].
    pub fn on_buffer_changed(&self, full_text: &str, changes: &[BufferChange]) {
        self.synchronizer.on_buffer_changed(full_text, changes);
    }

    /// Waits for every queued document sync call to finish.
    pub async fn flush_sync(&self) {
        self.synchronizer.flush().await;
    }

    /// The provider object registered with the editor.
    #[must_use]
    pub fn providers(&self) -> Arc<FeatureProviders> {
        self.providers.clone()
    }

    /// Snapshot of the live session.
    #[must_use]
    pub fn session(&self) -> Option<SessionInfo> {
        self.slot
            .current()
            .map(|session| SessionInfo::new(&session, self.synchronizer.version()))
    }

    /// Features of the live session, all false without one.
    #[must_use]
    pub fn features(&self) -> FeatureSupport {
        self.slot
            .current()
            .map(|session| session.features)
            .unwrap_or_default()
    }

    /// Capabilities of the live session, empty without one.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.slot
            .current()
            .map_or_else(Capabilities::empty, |session| session.capabilities.clone())
    }

    /// Current document version.
    #[must_use]
    pub fn document_version(&self) -> i32 {
        self.synchronizer.version()
    }
}
