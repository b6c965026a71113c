// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! An in-process [`Transport`] that answers from a script.
//!
//! Every call is recorded as a [`TransportCall`] with its method name and
//! a JSON rendering of its arguments. Replies come from, in order: the
//! one-shot queue for the method, the sticky reply for the method, or a
//! neutral default (`null`, empty list, or the echoed input).

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lsp_types::{
    CodeAction, CodeActionContext, CodeActionOrCommand, CompletionContext, CompletionResponse,
    DocumentHighlight, DocumentSymbolResponse, FormattingOptions, GotoDefinitionResponse, Hover,
    InlayHint, Location, Position, Range, SemanticTokensResult, SignatureHelp,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem, TextEdit,
    VersionedTextDocumentIdentifier, WorkspaceEdit, WorkspaceSymbolResponse,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tracing::trace;

use super::{
    DiagnosticsBatch, DiagnosticsFanout, DiagnosticsListener, RequestMeta, StartedSession,
    Transport, normalize_locations,
};
use crate::adapter::Capabilities;
use crate::config::ServerConfig;
use crate::disposable::Disposable;

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportCall {
    /// Method name, e.g. `"changeDocument"`.
    pub method: String,
    /// Session the call targeted, if any.
    pub session_id: Option<String>,
    /// Arguments rendered as JSON.
    pub params: Value,
}

type Outcome = std::result::Result<Value, String>;

enum Scripted {
    Ready(Outcome),
    Deferred(oneshot::Receiver<Outcome>),
}

/// Completes a call queued with [`ScriptedTransport::defer`].
///
/// Dropping it without answering fails the call.
#[derive(Debug)]
pub struct DeferredReply {
    sender: oneshot::Sender<Outcome>,
}

impl DeferredReply {
    /// Answers the held call with `value`.
    pub fn resolve(self, value: Value) {
        self.sender.send(Ok(value)).ok();
    }

    /// Fails the held call with `message`.
    pub fn reject(self, message: &str) {
        self.sender.send(Err(message.to_string())).ok();
    }
}

#[derive(Default)]
struct Script {
    once: HashMap<String, VecDeque<Scripted>>,
    sticky: HashMap<String, Outcome>,
}

/// Scriptable transport for tests and headless runs.
pub struct ScriptedTransport {
    available: AtomicBool,
    capabilities: Mutex<Value>,
    script: Mutex<Script>,
    calls: Mutex<Vec<TransportCall>>,
    call_count: watch::Sender<usize>,
    diagnostics: DiagnosticsFanout,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// An available transport whose servers advertise nothing.
    #[must_use]
    pub fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        Self {
            available: AtomicBool::new(true),
            capabilities: Mutex::new(json!({})),
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
            call_count,
            diagnostics: DiagnosticsFanout::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Capabilities returned by later `start_session` calls.
    pub fn set_capabilities(&self, capabilities: Value) {
        *lock(&self.capabilities) = capabilities;
    }

    /// Toggles [`Transport::is_available`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Answers every later `method` call with `value`.
    pub fn reply(&self, method: &str, value: Value) {
        lock(&self.script)
            .sticky
            .insert(method.to_string(), Ok(value));
    }

    /// Fails every later `method` call with `message`.
    pub fn fail(&self, method: &str, message: &str) {
        lock(&self.script)
            .sticky
            .insert(method.to_string(), Err(message.to_string()));
    }

    /// Answers the next `method` call with `value`.
    pub fn reply_once(&self, method: &str, value: Value) {
        self.enqueue(method, Scripted::Ready(Ok(value)));
    }

    /// Fails the next `method` call with `message`.
    pub fn fail_once(&self, method: &str, message: &str) {
        self.enqueue(method, Scripted::Ready(Err(message.to_string())));
    }

    /// Holds the next `method` call until the returned handle answers it.
    pub fn defer(&self, method: &str) -> DeferredReply {
        let (sender, receiver) = oneshot::channel();
        self.enqueue(method, Scripted::Deferred(receiver));
        DeferredReply { sender }
    }

    fn enqueue(&self, method: &str, scripted: Scripted) {
        lock(&self.script)
            .once
            .entry(method.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    /// Calls to `method` so far, oldest first.
    pub fn calls_to(&self, method: &str) -> Vec<TransportCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Resolves once at least `count` calls to `method` were recorded.
    pub async fn wait_for(&self, method: &str, count: usize) {
        let mut updates = self.call_count.subscribe();
        while self.calls_to(method).len() < count {
            if updates.changed().await.is_err() {
                return;
            }
        }
    }

    /// Delivers `batch` to every diagnostics listener.
    pub fn emit_diagnostics(&self, batch: &DiagnosticsBatch) {
        self.diagnostics.emit(batch);
    }

    /// Number of live diagnostics listeners.
    pub fn listener_count(&self) -> usize {
        self.diagnostics.len()
    }

    fn record(&self, method: &str, session_id: Option<&str>, params: Value) {
        trace!("scripted {method} {params}");
        lock(&self.calls).push(TransportCall {
            method: method.to_string(),
            session_id: session_id.map(str::to_string),
            params,
        });
        self.call_count.send_modify(|count| *count += 1);
    }

    /// Records the call and produces its scripted answer, if any.
    async fn answer(
        &self,
        method: &str,
        session_id: Option<&str>,
        params: Value,
    ) -> Result<Option<Value>> {
        self.record(method, session_id, params);
        let scripted = {
            let mut script = lock(&self.script);
            match script.once.get_mut(method).and_then(VecDeque::pop_front) {
                Some(scripted) => Some(scripted),
                None => script.sticky.get(method).cloned().map(Scripted::Ready),
            }
        };
        let outcome = match scripted {
            None => return Ok(None),
            Some(Scripted::Ready(outcome)) => outcome,
            Some(Scripted::Deferred(receiver)) => receiver
                .await
                .unwrap_or_else(|_| Err(format!("{method} was never answered"))),
        };
        outcome.map(Some).map_err(|message| anyhow!(message))
    }

    async fn notify(&self, method: &str, session_id: &str, params: Value) -> Result<()> {
        self.answer(method, Some(session_id), params).await?;
        Ok(())
    }

    /// A call whose `null` or missing answer decodes to `T::default()`.
    async fn query<T: DeserializeOwned + Default>(
        &self,
        method: &str,
        session_id: &str,
        params: Value,
    ) -> Result<T> {
        match self.answer(method, Some(session_id), params).await? {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Scripted {method} reply has the wrong shape")),
        }
    }
}

fn meta_json(meta: Option<&RequestMeta>) -> Value {
    meta.and_then(|meta| serde_json::to_value(meta).ok())
        .unwrap_or(Value::Null)
}

fn position_params(
    document: &TextDocumentIdentifier,
    position: Position,
    meta: Option<&RequestMeta>,
) -> Value {
    json!({
        "document": document,
        "position": position,
        "meta": meta_json(meta),
    })
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn start_session(
        &self,
        language_id: &str,
        root_uri: Option<&str>,
        launch: Option<&ServerConfig>,
    ) -> Result<StartedSession> {
        let params = json!({
            "languageId": language_id,
            "rootUri": root_uri,
            "command": launch.map(|server| server.command.clone()),
        });
        let capabilities = match self.answer("startSession", None, params).await? {
            Some(Value::Null) | None => lock(&self.capabilities).clone(),
            Some(scripted) => scripted,
        };
        let session_id = format!("scripted-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(StartedSession {
            session_id,
            capabilities: Capabilities::new(capabilities),
        })
    }

    async fn open_document(&self, session_id: &str, document: TextDocumentItem) -> Result<()> {
        self.notify("openDocument", session_id, json!({ "document": document }))
            .await
    }

    async fn change_document(
        &self,
        session_id: &str,
        document: VersionedTextDocumentIdentifier,
        full_text: &str,
        content_changes: Option<Vec<TextDocumentContentChangeEvent>>,
    ) -> Result<()> {
        let params = json!({
            "document": document,
            "fullText": full_text,
            "contentChanges": content_changes,
        });
        self.notify("changeDocument", session_id, params).await
    }

    async fn close_document(
        &self,
        session_id: &str,
        document: TextDocumentIdentifier,
    ) -> Result<()> {
        self.notify("closeDocument", session_id, json!({ "document": document }))
            .await
    }

    async fn shutdown_session(&self, session_id: &str) -> Result<()> {
        self.notify("shutdownSession", session_id, Value::Null)
            .await
    }

    async fn completion(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        context: Option<CompletionContext>,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<CompletionResponse>> {
        let mut params = position_params(document, position, meta);
        params["context"] = serde_json::to_value(context)?;
        self.query("completion", session_id, params).await
    }

    async fn hover(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<Hover>> {
        self.query("hover", session_id, position_params(document, position, meta))
            .await
    }

    async fn definition(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        let response: Option<GotoDefinitionResponse> = self
            .query("definition", session_id, position_params(document, position, meta))
            .await?;
        Ok(normalize_locations(response))
    }

    async fn implementation(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        let response: Option<GotoDefinitionResponse> = self
            .query(
                "implementation",
                session_id,
                position_params(document, position, meta),
            )
            .await?;
        Ok(normalize_locations(response))
    }

    async fn type_definition(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        let response: Option<GotoDefinitionResponse> = self
            .query(
                "typeDefinition",
                session_id,
                position_params(document, position, meta),
            )
            .await?;
        Ok(normalize_locations(response))
    }

    async fn references(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        include_declaration: bool,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        let mut params = position_params(document, position, meta);
        params["includeDeclaration"] = Value::Bool(include_declaration);
        self.query("references", session_id, params).await
    }

    async fn rename(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        new_name: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<WorkspaceEdit>> {
        let mut params = position_params(document, position, meta);
        params["newName"] = Value::String(new_name.to_string());
        self.query("rename", session_id, params).await
    }

    async fn code_actions(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        range: Range,
        context: CodeActionContext,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<CodeActionOrCommand>> {
        let params = json!({
            "document": document,
            "range": range,
            "context": context,
            "meta": meta_json(meta),
        });
        self.query("codeActions", session_id, params).await
    }

    async fn resolve_code_action(
        &self,
        session_id: &str,
        action: CodeAction,
    ) -> Result<CodeAction> {
        let params = json!({ "action": action });
        match self
            .answer("resolveCodeAction", Some(session_id), params)
            .await?
        {
            None | Some(Value::Null) => Ok(action),
            Some(value) => serde_json::from_value(value)
                .context("Scripted resolveCodeAction reply has the wrong shape"),
        }
    }

    async fn format_document(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        options: FormattingOptions,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<TextEdit>> {
        let params = json!({
            "document": document,
            "options": options,
            "meta": meta_json(meta),
        });
        self.query("formatDocument", session_id, params).await
    }

    async fn document_symbols(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let params = json!({ "document": document, "meta": meta_json(meta) });
        self.query("documentSymbols", session_id, params).await
    }

    async fn workspace_symbols(
        &self,
        session_id: &str,
        query: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<WorkspaceSymbolResponse>> {
        let params = json!({ "query": query, "meta": meta_json(meta) });
        self.query("workspaceSymbols", session_id, params).await
    }

    async fn signature_help(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<SignatureHelp>> {
        self.query(
            "signatureHelp",
            session_id,
            position_params(document, position, meta),
        )
        .await
    }

    async fn document_highlights(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<DocumentHighlight>> {
        self.query(
            "documentHighlights",
            session_id,
            position_params(document, position, meta),
        )
        .await
    }

    async fn inlay_hints(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        range: Range,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<InlayHint>> {
        let params = json!({
            "document": document,
            "range": range,
            "meta": meta_json(meta),
        });
        self.query("inlayHints", session_id, params).await
    }

    async fn semantic_tokens_full(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<SemanticTokensResult>> {
        let params = json!({ "document": document, "meta": meta_json(meta) });
        self.query("semanticTokensFull", session_id, params).await
    }

    async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>> {
        let params = json!({ "command": command, "arguments": arguments });
        let value = self
            .answer("executeCommand", Some(session_id), params)
            .await?;
        Ok(value.filter(|value| !value.is_null()))
    }

    async fn cancel_request(&self, session_id: &str, client_request_id: &str) -> Result<()> {
        let params = json!({ "clientRequestId": client_request_id });
        self.notify("cancelRequest", session_id, params).await
    }

    fn listen_diagnostics(&self, listener: DiagnosticsListener) -> Disposable {
        self.diagnostics.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::parse_uri;
    use std::sync::Arc;

    fn document() -> Result<TextDocumentIdentifier> {
        Ok(TextDocumentIdentifier::new(parse_uri("file:///tmp/a.ts")?))
    }

    #[tokio::test]
    async fn once_replies_take_precedence_over_sticky() -> Result<()> {
        let transport = ScriptedTransport::new();
        transport.reply("hover", json!({ "contents": "sticky" }));
        transport.reply_once("hover", json!({ "contents": "once" }));
        let doc = document()?;

        let first = transport
            .hover("s", &doc, Position::new(0, 0), None)
            .await?
            .context("no first hover")?;
        let second = transport
            .hover("s", &doc, Position::new(0, 0), None)
            .await?
            .context("no second hover")?;

        assert_eq!(
            serde_json::to_value(first.contents)?,
            json!("once")
        );
        assert_eq!(
            serde_json::to_value(second.contents)?,
            json!("sticky")
        );
        Ok(())
    }

    #[tokio::test]
    async fn unscripted_queries_return_empty() -> Result<()> {
        let transport = ScriptedTransport::new();
        let doc = document()?;

        assert!(
            transport
                .definition("s", &doc, Position::new(0, 0), None)
                .await?
                .is_empty()
        );
        assert!(
            transport
                .execute_command("s", "noop", Vec::new())
                .await?
                .is_none()
        );
        assert_eq!(transport.calls().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn deferred_reply_holds_the_call() -> Result<()> {
        let transport = Arc::new(ScriptedTransport::new());
        let reply = transport.defer("hover");
        let doc = document()?;

        let pending = {
            let transport = transport.clone();
            tokio::spawn(async move {
                transport
                    .hover("s", &doc, Position::new(0, 0), None)
                    .await
            })
        };
        transport.wait_for("hover", 1).await;
        reply.resolve(json!({ "contents": "late" }));

        let hover = pending.await??.context("no hover")?;
        assert_eq!(serde_json::to_value(hover.contents)?, json!("late"));
        Ok(())
    }

    #[test]
    fn listeners_detach_on_dispose() {
        let transport = ScriptedTransport::new();
        let handle = transport.listen_diagnostics(Arc::new(|_: DiagnosticsBatch| {}));
        assert_eq!(transport.listener_count(), 1);
        handle.dispose();
        assert_eq!(transport.listener_count(), 0);
    }

    #[tokio::test]
    async fn start_session_uses_configured_capabilities() -> Result<()> {
        let transport = ScriptedTransport::new();
        transport.set_capabilities(json!({ "hoverProvider": true }));

        let first = transport.start_session("rust", None, None).await?;
        let second = transport.start_session("rust", None, None).await?;

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(first.capabilities.raw(), &json!({ "hoverProvider": true }));
        Ok(())
    }
}
