// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A [`Transport`] that runs one language-server process per session.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lsp_types::{
    CodeAction, CodeActionContext, CodeActionOrCommand, CompletionContext, CompletionResponse,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentHighlight, DocumentSymbolResponse, FormattingOptions, GotoDefinitionResponse, Hover,
    InlayHint, Location, Position, PublishDiagnosticsParams, Range, SemanticTokensResult,
    SignatureHelp, TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextEdit, VersionedTextDocumentIdentifier, WorkspaceEdit, WorkspaceSymbolResponse,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{DiagnosticsSink, ServerConnection};
use super::{
    DEFAULT_REQUEST_TIMEOUT, DiagnosticsBatch, DiagnosticsFanout, DiagnosticsListener,
    RequestMeta, StartedSession, Transport, normalize_locations,
};
use crate::adapter::Capabilities;
use crate::config::ServerConfig;
use crate::disposable::Disposable;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns configured language servers and speaks LSP to them over stdio.
pub struct StdioTransport {
    servers: HashMap<String, ServerConfig>,
    sessions: Mutex<HashMap<String, Arc<ServerConnection>>>,
    diagnostics: Arc<DiagnosticsFanout>,
}

impl StdioTransport {
    /// Creates a transport that launches `servers[language_id]` unless a
    /// session supplies its own launch configuration.
    #[must_use]
    pub fn new(servers: HashMap<String, ServerConfig>) -> Self {
        Self {
            servers,
            sessions: Mutex::new(HashMap::new()),
            diagnostics: Arc::new(DiagnosticsFanout::default()),
        }
    }

    /// Number of sessions with a live entry.
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn connection(&self, session_id: &str) -> Result<Arc<ServerConnection>> {
        lock(&self.sessions)
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown session: {session_id}"))
    }

    async fn query<R: DeserializeOwned>(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
        meta: Option<&RequestMeta>,
    ) -> Result<R> {
        let connection = self.connection(session_id)?;
        connection
            .request_as(
                method,
                params,
                RequestMeta::timeout_of(meta),
                meta.map(|m| m.client_request_id.as_str()),
            )
            .await
    }

    /// A query whose `null` result means an empty list.
    async fn query_list<T: DeserializeOwned>(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<T>> {
        let items: Option<Vec<T>> = self.query(session_id, method, params, meta).await?;
        Ok(items.unwrap_or_default())
    }

    async fn locations(
        &self,
        session_id: &str,
        method: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        let response: Option<GotoDefinitionResponse> = self
            .query(session_id, method, position_params(document, position), meta)
            .await?;
        Ok(normalize_locations(response))
    }

    fn sink_for(&self, session_id: &str) -> DiagnosticsSink {
        let session_id = session_id.to_string();
        let fanout = Arc::clone(&self.diagnostics);
        Arc::new(move |params: PublishDiagnosticsParams| {
            fanout.emit(&DiagnosticsBatch {
                session_id: session_id.clone(),
                uri: params.uri,
                version: params.version,
                diagnostics: params.diagnostics,
            });
        })
    }
}

fn position_params(document: &TextDocumentIdentifier, position: Position) -> Value {
    json!({ "textDocument": document, "position": position })
}

#[async_trait]
impl Transport for StdioTransport {
    /// Process spawning is always possible here; a missing server binary
    /// surfaces as a startup failure instead.
    fn is_available(&self) -> bool {
        true
    }

    async fn start_session(
        &self,
        language_id: &str,
        root_uri: Option<&str>,
        launch: Option<&ServerConfig>,
    ) -> Result<StartedSession> {
        let server = launch
            .or_else(|| self.servers.get(language_id))
            .with_context(|| format!("No language server configured for '{language_id}'"))?;

        let session_id = Uuid::new_v4().to_string();
        let connection = ServerConnection::spawn(server, self.sink_for(&session_id))?;

        let capabilities = match connection
            .initialize(root_uri, server.initialization_options.clone())
            .await
        {
            Ok(capabilities) => capabilities,
            Err(e) => {
                if let Err(shutdown_error) = connection.shutdown().await {
                    debug!("Shutdown after failed handshake: {shutdown_error}");
                }
                return Err(e.context(format!("Failed to initialize {}", server.command)));
            }
        };

        info!(
            "Started {} for {language_id} as session {session_id}",
            server.command
        );
        lock(&self.sessions).insert(session_id.clone(), Arc::new(connection));
        Ok(StartedSession {
            session_id,
            capabilities: Capabilities::new(capabilities),
        })
    }

    async fn open_document(&self, session_id: &str, document: TextDocumentItem) -> Result<()> {
        self.connection(session_id)?
            .notify(
                "textDocument/didOpen",
                DidOpenTextDocumentParams {
                    text_document: document,
                },
            )
            .await
    }

    async fn change_document(
        &self,
        session_id: &str,
        document: VersionedTextDocumentIdentifier,
        full_text: &str,
        content_changes: Option<Vec<TextDocumentContentChangeEvent>>,
    ) -> Result<()> {
        let content_changes = content_changes.unwrap_or_else(|| {
            vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: full_text.to_string(),
            }]
        });
        self.connection(session_id)?
            .notify(
                "textDocument/didChange",
                DidChangeTextDocumentParams {
                    text_document: document,
                    content_changes,
                },
            )
            .await
    }

    async fn close_document(
        &self,
        session_id: &str,
        document: TextDocumentIdentifier,
    ) -> Result<()> {
        self.connection(session_id)?
            .notify(
                "textDocument/didClose",
                DidCloseTextDocumentParams {
                    text_document: document,
                },
            )
            .await
    }

    async fn shutdown_session(&self, session_id: &str) -> Result<()> {
        let Some(connection) = lock(&self.sessions).remove(session_id) else {
            debug!("Shutdown of unknown session {session_id} ignored");
            return Ok(());
        };
        connection.shutdown().await
    }

    async fn completion(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        context: Option<CompletionContext>,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<CompletionResponse>> {
        let mut params = position_params(document, position);
        if let Some(context) = context {
            params["context"] = serde_json::to_value(context)?;
        }
        self.query(session_id, "textDocument/completion", params, meta)
            .await
    }

    async fn hover(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<Hover>> {
        self.query(
            session_id,
            "textDocument/hover",
            position_params(document, position),
            meta,
        )
        .await
    }

    async fn definition(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        self.locations(session_id, "textDocument/definition", document, position, meta)
            .await
    }

    async fn implementation(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        self.locations(
            session_id,
            "textDocument/implementation",
            document,
            position,
            meta,
        )
        .await
    }

    async fn type_definition(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        self.locations(
            session_id,
            "textDocument/typeDefinition",
            document,
            position,
            meta,
        )
        .await
    }

    async fn references(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        include_declaration: bool,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<Location>> {
        let mut params = position_params(document, position);
        params["context"] = json!({ "includeDeclaration": include_declaration });
        self.query_list(session_id, "textDocument/references", params, meta)
            .await
    }

    async fn rename(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        new_name: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<WorkspaceEdit>> {
        let mut params = position_params(document, position);
        params["newName"] = Value::String(new_name.to_string());
        self.query(session_id, "textDocument/rename", params, meta)
            .await
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
            "textDocument": document,
            "range": range,
            "context": context,
        });
        self.query_list(session_id, "textDocument/codeAction", params, meta)
            .await
    }

    async fn resolve_code_action(
        &self,
        session_id: &str,
        action: CodeAction,
    ) -> Result<CodeAction> {
        self.connection(session_id)?
            .request_as("codeAction/resolve", action, DEFAULT_REQUEST_TIMEOUT, None)
            .await
    }

    async fn format_document(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        options: FormattingOptions,
        meta: Option<&RequestMeta>,
    ) -> Result<Vec<TextEdit>> {
        let params = json!({ "textDocument": document, "options": options });
        self.query_list(session_id, "textDocument/formatting", params, meta)
            .await
    }

    async fn document_symbols(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let params = json!({ "textDocument": document });
        self.query(session_id, "textDocument/documentSymbol", params, meta)
            .await
    }

    async fn workspace_symbols(
        &self,
        session_id: &str,
        query: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<WorkspaceSymbolResponse>> {
        let params = json!({ "query": query });
        self.query(session_id, "workspace/symbol", params, meta)
            .await
    }

    async fn signature_help(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        position: Position,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<SignatureHelp>> {
        self.query(
            session_id,
            "textDocument/signatureHelp",
            position_params(document, position),
            meta,
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
        self.query_list(
            session_id,
            "textDocument/documentHighlight",
            position_params(document, position),
            meta,
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
        let params = json!({ "textDocument": document, "range": range });
        self.query_list(session_id, "textDocument/inlayHint", params, meta)
            .await
    }

    async fn semantic_tokens_full(
        &self,
        session_id: &str,
        document: &TextDocumentIdentifier,
        meta: Option<&RequestMeta>,
    ) -> Result<Option<SemanticTokensResult>> {
        let params = json!({ "textDocument": document });
        self.query(
            session_id,
            "textDocument/semanticTokens/full",
            params,
            meta,
        )
        .await
    }

    async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>> {
        let params = json!({ "command": command, "arguments": arguments });
        self.connection(session_id)?
            .request_as(
                "workspace/executeCommand",
                params,
                DEFAULT_REQUEST_TIMEOUT,
                None,
            )
            .await
    }

    async fn cancel_request(&self, session_id: &str, client_request_id: &str) -> Result<()> {
        let Ok(connection) = self.connection(session_id) else {
            warn!("Cancel for unknown session {session_id} ignored");
            return Ok(());
        };
        connection.cancel(client_request_id).await
    }

    fn listen_diagnostics(&self, listener: DiagnosticsListener) -> Disposable {
        self.diagnostics.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_sessions_are_tolerated() -> Result<()> {
        let transport = StdioTransport::new(HashMap::new());
        transport.shutdown_session("missing").await?;
        transport.cancel_request("missing", "hover:1:1").await?;
        assert_eq!(transport.session_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn start_without_server_config_fails() {
        let transport = StdioTransport::new(HashMap::new());
        let error = transport
            .start_session("cobol", None, None)
            .await
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            error.as_deref(),
            Some("No language server configured for 'cobol'")
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let transport = StdioTransport::new(HashMap::new());
        let launch = ServerConfig {
            command: "/nonexistent/bridle-test-server".to_string(),
            args: Vec::new(),
            initialization_options: None,
        };
        let result = transport.start_session("rust", None, Some(&launch)).await;
        assert!(result.is_err());
        assert_eq!(transport.session_count(), 0);
    }

    #[tokio::test]
    async fn queries_on_unknown_session_fail() -> Result<()> {
        let transport = StdioTransport::new(HashMap::new());
        let document = TextDocumentIdentifier::new(crate::editor::parse_uri("file:///a.rs")?);
        let result = transport
            .hover("missing", &document, Position::new(0, 0), None)
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
