// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The transport the adapter issues protocol calls through.
//!
//! [`Transport`] is the only seam between the adapter core and a language
//! server. [`StdioTransport`] drives real servers over stdio;
//! [`ScriptedTransport`] answers from an in-process script.

/// A single language-server process and its JSON-RPC plumbing.
pub mod connection;
/// `Content-Length` framing and JSON-RPC message types.
pub mod protocol;
/// In-process transport driven by a script.
pub mod scripted;
/// Transport that spawns language servers over stdio.
pub mod stdio;

pub use scripted::{DeferredReply, ScriptedTransport, TransportCall};
pub use stdio::StdioTransport;

use anyhow::Result;
use async_trait::async_trait;
use lsp_types::{
    CodeAction, CodeActionContext, CodeActionOrCommand, CompletionContext, CompletionResponse,
    Diagnostic, DocumentHighlight, DocumentSymbolResponse, FormattingOptions,
    GotoDefinitionResponse, Hover, InlayHint, Location, Position, Range, SemanticTokensResult,
    SignatureHelp, TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextEdit, Uri, VersionedTextDocumentIdentifier, WorkspaceEdit, WorkspaceSymbolResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::adapter::Capabilities;
use crate::config::ServerConfig;
use crate::disposable::Disposable;

/// Timeout applied when a request carries no [`RequestMeta`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a successful `start_session`.
#[derive(Debug, Clone)]
pub struct StartedSession {
    /// Transport-assigned id used on every later call.
    pub session_id: String,
    /// The server's advertised capabilities.
    pub capabilities: Capabilities,
}

/// Per-request bookkeeping passed along with feature queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Identifier the adapter later uses with [`Transport::cancel_request`].
    pub client_request_id: String,
    /// How long the transport may wait for the server.
    #[serde(rename = "timeoutMs", serialize_with = "serialize_millis")]
    pub timeout: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl RequestMeta {
    /// The timeout to use for a call that may or may not carry meta.
    #[must_use]
    pub fn timeout_of(meta: Option<&Self>) -> Duration {
        meta.map_or(DEFAULT_REQUEST_TIMEOUT, |m| m.timeout)
    }
}

/// A diagnostics push from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsBatch {
    /// Session the diagnostics belong to.
    pub session_id: String,
    /// Document the diagnostics describe.
    pub uri: Uri,
    /// Document version the server analysed, if it said.
    #[serde(default)]
    pub version: Option<i32>,
    /// The complete diagnostic set for the document.
    pub diagnostics: Vec<Diagnostic>,
}

/// Callback receiving every diagnostics push.
pub type DiagnosticsListener = Arc<dyn Fn(DiagnosticsBatch) + Send + Sync>;

/// The set of diagnostics listeners a transport delivers pushes to.
#[derive(Default)]
pub struct DiagnosticsFanout {
    next_id: AtomicU64,
    listeners: Arc<Mutex<Vec<(u64, DiagnosticsListener)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DiagnosticsFanout {
    /// Adds `listener`; disposing the handle removes it again.
    pub fn subscribe(&self, listener: DiagnosticsListener) -> Disposable {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).push((id, listener));
        let listeners = Arc::clone(&self.listeners);
        Disposable::new(move || {
            lock(&listeners).retain(|(entry, _)| *entry != id);
        })
    }

    /// Delivers `batch` to every listener.
    ///
    /// Listeners run outside the registry lock so they may subscribe or
    /// unsubscribe re-entrantly.
    pub fn emit(&self, batch: &DiagnosticsBatch) {
        let listeners: Vec<DiagnosticsListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(batch.clone());
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Whether nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Protocol operations the adapter relies on.
///
/// Feature queries take an optional [`RequestMeta`]; a transport that
/// supports cancellation must remember `client_request_id` until the
/// request settles.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether this environment can reach language servers at all.
    fn is_available(&self) -> bool;

    /// Launches (or connects to) a server and performs the handshake.
    async fn start_session(
        &self,
        language_id: &str,
        root_uri: Option<&str>,
        launch: Option<&ServerConfig>,
    ) -> Result<StartedSession>;

    /// `textDocument/didOpen`
    async fn open_document(&self, session_id: &str, document: TextDocumentItem) -> Result<()>;

    /// `textDocument/didChange`. `None` changes mean "replace with
    /// `full_text`".
    async fn change_document(
        &self,
        session_id: &str,
        document: VersionedTextDocumentIdentifier,
        full_text: &str,
        content_changes: Option<Vec<TextDocumentContentChangeEvent>>,
    ) -> Result<()>;

    /// `textDocument/didClose`
    async fn close_document(&self, session_id: &str, document: TextDocumentIdentifier)
    -> Result<()>;

    /// Shuts the server down. Unknown sessions are a no-op.
    async fn shutdown_session(&self, session_id: &str) -> Result<()>;

    /// `textDocument/completion`
    async fn completion(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        context: Option<CompletionContext>,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<CompletionResponse>>;

    /// `textDocument/hover`
    async fn hover(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<Hover>>;

    /// `textDocument/definition`, normalised to locations.
    async fn definition(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>>;

    /// `textDocument/implementation`, normalised to locations.
    async fn implementation(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>>;

    /// `textDocument/typeDefinition`, normalised to locations.
    async fn type_definition(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>>;

    /// `textDocument/references`
    async fn references(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        include_declaration: bool,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>>;

    /// `textDocument/rename`
    async fn rename(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        new_name: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<WorkspaceEdit>>;

    /// `textDocument/codeAction`
    async fn code_actions(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        range: Range,
        context: CodeActionContext,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<CodeActionOrCommand>>;

    /// `codeAction/resolve`
    async fn resolve_code_action(&self, session_id: &str, action: CodeAction)
    -> Result<CodeAction>;

    /// `textDocument/formatting`
    async fn format_document(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        options: FormattingOptions,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<TextEdit>>;

    /// `textDocument/documentSymbol`
    async fn document_symbols(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<DocumentSymbolResponse>>;

    /// `workspace/symbol`
    async fn workspace_symbols(
        &self,
        session_id: &str,
        query: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<WorkspaceSymbolResponse>>;

    /// `textDocument/signatureHelp`
    async fn signature_help(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<SignatureHelp>>;

    /// `textDocument/documentHighlight`
    async fn document_highlights(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<DocumentHighlight>>;

    /// `textDocument/inlayHint`
    async fn inlay_hints(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        range: Range,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<InlayHint>>;

    /// `textDocument/semanticTokens/full`
    async fn semantic_tokens_full(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<SemanticTokensResult>>;

    /// `workspace/executeCommand`
    async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>>;

    /// Asks the server to abandon a request. Unknown ids are ignored.
    async fn cancel_request(&self, session_id: &str, client_request_id: &str) -> Result<()>;

    /// Subscribes to diagnostics pushes from every session.
    fn listen_diagnostics(&self, listener: DiagnosticsListener) -> Disposable;
}

/// Flattens any definition-shaped result into plain locations.
///
/// Link results use their target selection range, which points at the
/// symbol name rather than the whole declaration.
#[must_use]
pub fn normalize_locations(response: Option<GotoDefinitionResponse>) -> Vec<Location> {
    match response {
        None => Vec::new(),
        Some(GotoDefinitionResponse::Scalar(location)) => vec![location],
        Some(GotoDefinitionResponse::Array(locations)) => locations,
        Some(GotoDefinitionResponse::Link(links)) => links
            .into_iter()
            .map(|link| Location::new(link.target_uri, link.target_selection_range))
            .collect(),
    }
}
