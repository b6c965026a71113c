// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use anyhow::{Context, Result, anyhow};
use bytes::BytesMut;
use lsp_types::{
    ClientCapabilities, CodeActionCapabilityResolveSupport, CodeActionClientCapabilities,
    CodeActionKind, CodeActionKindLiteralSupport, CodeActionLiteralSupport,
    CompletionClientCapabilities, CompletionItemCapability, DocumentSymbolClientCapabilities,
    DynamicRegistrationClientCapabilities, GeneralClientCapabilities, GotoCapability,
    HoverClientCapabilities, InitializeParams, InitializedParams, InlayHintClientCapabilities,
    MarkupKind, PositionEncodingKind, PublishDiagnosticsClientCapabilities,
    PublishDiagnosticsParams, RenameClientCapabilities, TextDocumentClientCapabilities,
    WorkspaceClientCapabilities, WorkspaceEditClientCapabilities, WorkspaceFolder,
    WorkspaceSymbolClientCapabilities,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::protocol::{
    self, IncomingMessage, NotificationMessage, RequestId, RequestMessage, ResponseMessage,
};
use crate::config::ServerConfig;
use crate::editor::parse_uri;

/// How long `shutdown` waits for the server to acknowledge.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the `initialize` handshake may take.
const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// What the adapter can consume, sent with `initialize`.
///
/// Code actions are requested as literals with lazily resolved edits so the
/// raw action can round-trip through `codeAction/resolve`.
#[must_use]
pub fn client_capabilities() -> ClientCapabilities {
    let markup = || Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]);
    let goto = || {
        Some(GotoCapability {
            link_support: Some(true),
            ..Default::default()
        })
    };
    let action_kinds = [
        CodeActionKind::EMPTY,
        CodeActionKind::QUICKFIX,
        CodeActionKind::REFACTOR,
        CodeActionKind::REFACTOR_EXTRACT,
        CodeActionKind::REFACTOR_INLINE,
        CodeActionKind::REFACTOR_REWRITE,
        CodeActionKind::SOURCE,
        CodeActionKind::SOURCE_ORGANIZE_IMPORTS,
    ];

    ClientCapabilities {
        general: Some(GeneralClientCapabilities {
            position_encodings: Some(vec![PositionEncodingKind::UTF16]),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            completion: Some(CompletionClientCapabilities {
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(true),
                    documentation_format: markup(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                content_format: markup(),
                ..Default::default()
            }),
            definition: goto(),
            type_definition: goto(),
            implementation: goto(),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            code_action: Some(CodeActionClientCapabilities {
                code_action_literal_support: Some(CodeActionLiteralSupport {
                    code_action_kind: CodeActionKindLiteralSupport {
                        value_set: action_kinds
                            .iter()
                            .map(|kind| kind.as_str().to_string())
                            .collect(),
                    },
                }),
                is_preferred_support: Some(true),
                disabled_support: Some(true),
                data_support: Some(true),
                resolve_support: Some(CodeActionCapabilityResolveSupport {
                    properties: vec!["edit".to_string()],
                }),
                ..Default::default()
            }),
            rename: Some(RenameClientCapabilities {
                prepare_support: Some(true),
                ..Default::default()
            }),
            inlay_hint: Some(InlayHintClientCapabilities::default()),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                version_support: Some(true),
                related_information: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        workspace: Some(WorkspaceClientCapabilities {
            workspace_folders: Some(true),
            symbol: Some(WorkspaceSymbolClientCapabilities::default()),
            execute_command: Some(DynamicRegistrationClientCapabilities::default()),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Receives `textDocument/publishDiagnostics` pushes.
pub type DiagnosticsSink = Arc<dyn Fn(PublishDiagnosticsParams) + Send + Sync>;

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>>;

/// One running language server and the JSON-RPC plumbing around it.
pub struct ServerConnection {
    command: String,
    next_id: AtomicI64,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    client_ids: Mutex<HashMap<String, RequestId>>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    child: Mutex<Child>,
}

impl ServerConnection {
    /// Spawns the server process and starts the message reader task.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub fn spawn(server: &ServerConfig, diagnostics: DiagnosticsSink) -> Result<Self> {
        let mut child = Command::new(&server.command)
            .args(&server.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn language server: {}", server.command))?;

        let stdin = child.stdin.take().context("Server stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("Server stdout was not captured")?;

        let stdin = Arc::new(Mutex::new(stdin));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(reader_task(
            stdin.clone(),
            stdout,
            pending.clone(),
            diagnostics,
            alive.clone(),
        ));

        debug!("Spawned language server {}", server.command);
        Ok(Self {
            command: server.command.clone(),
            next_id: AtomicI64::new(1),
            stdin,
            pending,
            client_ids: Mutex::new(HashMap::new()),
            alive,
            reader,
            child: Mutex::new(child),
        })
    }

    /// Performs the `initialize` / `initialized` handshake and returns the
    /// raw capabilities object.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects or does not answer the
    /// handshake.
    #[allow(deprecated, reason = "older servers only read root_uri")]
    pub async fn initialize(
        &self,
        root_uri: Option<&str>,
        initialization_options: Option<Value>,
    ) -> Result<Value> {
        let root = root_uri.map(parse_uri).transpose()?;
        let workspace_folders = root.as_ref().zip(root_uri).map(|(uri, raw)| {
            vec![WorkspaceFolder {
                uri: uri.clone(),
                name: folder_name(raw),
            }]
        });

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: root,
            capabilities: client_capabilities(),
            workspace_folders,
            initialization_options,
            ..Default::default()
        };

        let result = self
            .request("initialize", params, INITIALIZE_TIMEOUT, None)
            .await?;
        self.notify("initialized", InitializedParams {}).await?;

        Ok(result
            .get("capabilities")
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    /// Sends a request and waits up to `timeout` for its response.
    ///
    /// A `client_request_id` makes the request cancelable through
    /// [`ServerConnection::cancel`] until it settles.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, a closed connection, or an error
    /// response from the server.
    pub async fn request<P: Serialize>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
        client_request_id: Option<&str>,
    ) -> Result<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = RequestMessage::new(id.clone(), method, serde_json::to_value(params)?);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        if let Some(client_id) = client_request_id {
            self.client_ids
                .lock()
                .await
                .insert(client_id.to_string(), id.clone());
        }

        let outcome = match self.send_message(&request).await {
            Ok(()) => tokio::time::timeout(timeout, rx).await,
            Err(e) => {
                self.forget(&id, client_request_id).await;
                return Err(e);
            }
        };
        self.forget(&id, client_request_id).await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(anyhow!("Language server closed connection")),
            Err(_) => {
                return Err(anyhow!(
                    "Request '{method}' timed out after {}ms",
                    timeout.as_millis()
                ));
            }
        };

        if let Some(error) = response.error {
            return Err(anyhow!("LSP error {}: {}", error.code, error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// [`ServerConnection::request`] decoded into `R`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the result has the wrong
    /// shape.
    pub async fn request_as<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
        client_request_id: Option<&str>,
    ) -> Result<R> {
        let value = self
            .request(method, params, timeout, client_request_id)
            .await?;
        serde_json::from_value(value).with_context(|| format!("Failed to parse {method} response"))
    }

    async fn forget(&self, id: &RequestId, client_request_id: Option<&str>) {
        self.pending.lock().await.remove(id);
        if let Some(client_id) = client_request_id {
            self.client_ids.lock().await.remove(client_id);
        }
    }

    /// Sends `$/cancelRequest` for an in-flight request. Ids that already
    /// settled, or were never issued, are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be written.
    pub async fn cancel(&self, client_request_id: &str) -> Result<()> {
        let id = self.client_ids.lock().await.get(client_request_id).cloned();
        let Some(id) = id else {
            trace!("No in-flight request for {client_request_id}");
            return Ok(());
        };
        self.notify("$/cancelRequest", json!({ "id": id })).await
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let notification = NotificationMessage::new(method, serde_json::to_value(params)?);
        self.send_message(&notification).await
    }

    async fn send_message<T: Serialize>(&self, message: &T) -> Result<()> {
        let framed = protocol::encode_message(message)?;
        trace!("Sending LSP message: {}", String::from_utf8_lossy(&framed));
        write_framed(&self.stdin, &framed).await
    }

    /// Sends `shutdown` and `exit` if the server is still alive, then kills
    /// the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejected `shutdown`. The process is
    /// killed either way.
    pub async fn shutdown(&self) -> Result<()> {
        let polite = if self.is_alive() {
            match self
                .request("shutdown", Value::Null, SHUTDOWN_TIMEOUT, None)
                .await
            {
                Ok(_) => self.notify("exit", Value::Null).await,
                Err(e) => Err(e),
            }
        } else {
            Ok(())
        };

        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            debug!("Kill after shutdown of {} failed: {e}", self.command);
        }
        self.reader.abort();
        self.alive.store(false, Ordering::SeqCst);
        polite
    }

    /// Returns true while the reader task still sees the server's stdout.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

fn folder_name(root_uri: &str) -> String {
    url::Url::parse(root_uri)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| "workspace".to_string())
}

async fn write_framed(stdin: &Mutex<ChildStdin>, framed: &[u8]) -> Result<()> {
    let mut stdin = stdin.lock().await;
    stdin.write_all(framed).await?;
    stdin.flush().await?;
    Ok(())
}

/// Background task that reads server messages and routes them.
async fn reader_task(
    stdin: Arc<Mutex<ChildStdin>>,
    stdout: ChildStdout,
    pending: PendingMap,
    diagnostics: DiagnosticsSink,
    alive: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buffer = BytesMut::with_capacity(8192);
    let mut temp = [0u8; 4096];

    'read: loop {
        match reader.read(&mut temp).await {
            Ok(0) => {
                debug!("Language server stdout closed");
                break;
            }
            Ok(n) => buffer.extend_from_slice(&temp[..n]),
            Err(e) => {
                error!("Error reading from language server: {e}");
                break;
            }
        }

        loop {
            let body = match protocol::try_parse_message(&mut buffer) {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(e) => {
                    error!("Unreadable message stream: {e:#}");
                    break 'read;
                }
            };
            trace!("Received LSP message: {body}");

            match IncomingMessage::parse(&body) {
                Ok(IncomingMessage::Request(request)) => {
                    debug!(
                        "Received server request: {} (id: {:?})",
                        request.method, request.id
                    );
                    let response = ResponseMessage::method_not_found(request.id, &request.method);
                    match protocol::encode_message(&response) {
                        Ok(framed) => {
                            if let Err(e) = write_framed(&stdin, &framed).await {
                                warn!("Failed to answer server request: {e}");
                            }
                        }
                        Err(e) => warn!("Failed to encode response: {e}"),
                    }
                }
                Ok(IncomingMessage::Response(response)) => {
                    let Some(id) = response.id.clone() else {
                        warn!("Response without id: {body}");
                        continue;
                    };
                    match pending.lock().await.remove(&id) {
                        Some(sender) => {
                            sender.send(response).ok();
                        }
                        None => trace!("Response for settled request {id:?}"),
                    }
                }
                Ok(IncomingMessage::Notification(notification)) => {
                    handle_notification(&notification, &diagnostics);
                }
                Err(e) => warn!("Dropping message: {e:#}"),
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed-channel error.
    pending.lock().await.clear();
    warn!("Language server connection lost");
}

fn handle_notification(notification: &NotificationMessage, diagnostics: &DiagnosticsSink) {
    match notification.method.as_str() {
        "textDocument/publishDiagnostics" => {
            match serde_json::from_value::<PublishDiagnosticsParams>(notification.params.clone()) {
                Ok(params) => {
                    debug!(
                        "Received {} diagnostics for {} (version {:?})",
                        params.diagnostics.len(),
                        params.uri.as_str(),
                        params.version
                    );
                    diagnostics(params);
                }
                Err(e) => warn!("Failed to parse publishDiagnostics params: {e}"),
            }
        }
        "window/logMessage" | "window/showMessage" => {
            if let Some(message) = notification.params.get("message").and_then(Value::as_str) {
                debug!("Language server message: {message}");
            }
        }
        _ => {
            trace!(
                "Ignoring notification: {} params={}",
                notification.method, notification.params
            );
        }
    }
}
