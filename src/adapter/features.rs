// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Editor-facing providers and their registration.

use lsp_types::{
    CodeActionContext, CodeActionOrCommand, CompletionContext, FormattingOptions,
    TextDocumentIdentifier,
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::capabilities::{FeatureKind, FeatureSupport};
use super::convert::{
    self, EditorCodeAction, EditorCompletionList, EditorHighlight, EditorInlayHint,
    EditorLocation, EditorSemanticTokens, EditorSignatureHelp, EditorSymbol,
    EditorSymbolLocation, EditorTextEdit, HoverContent, RenameResult,
};
use super::request::RequestLifecycle;
use super::session::{ActiveSession, SessionSlot};
use crate::disposable::Disposable;
use crate::editor::{EditorHost, EditorPosition, EditorRange};
use crate::error::AdapterError;
use crate::transport::Transport;

fn document(session: &ActiveSession) -> TextDocumentIdentifier {
    TextDocumentIdentifier::new(session.document_uri.clone())
}

fn direct_error(feature: &'static str, error: &anyhow::Error) -> AdapterError {
    AdapterError::FeatureQuery {
        feature,
        message: format!("{error:#}"),
    }
}

/// The provider object handed to the editor for every registered feature.
///
/// Queries that take a [`CancellationToken`] go through the request
/// lifecycle; the rest are direct transport calls that are dropped if the
/// session changed while they were in flight.
pub struct FeatureProviders {
    lifecycle: Arc<RequestLifecycle>,
    slot: Arc<SessionSlot>,
    transport: Arc<dyn Transport>,
}

impl FeatureProviders {
    pub(crate) fn new(
        lifecycle: Arc<RequestLifecycle>,
        slot: Arc<SessionSlot>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            lifecycle,
            slot,
            transport,
        }
    }

    /// Completion suggestions at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn completion(
        &self,
        position: EditorPosition,
        context: Option<CompletionContext>,
        token: &CancellationToken,
    ) -> Result<EditorCompletionList, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::Completion,
                token,
                EditorCompletionList::default(),
                move |session, meta| async move {
                    let response = transport
                        .completion(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            context,
                            Some(&meta),
                        )
                        .await?;
                    Ok(response.map(convert::completion_list).unwrap_or_default())
                },
            )
            .await
    }

    /// Hover content at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn hover(
        &self,
        position: EditorPosition,
        token: &CancellationToken,
    ) -> Result<Option<HoverContent>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::Hover,
                token,
                None,
                move |session, meta| async move {
                    let hover = transport
                        .hover(&session.id, &document(&session), position.to_lsp(), Some(&meta))
                        .await?;
                    Ok(hover.as_ref().map(convert::hover_content))
                },
            )
            .await
    }

    /// Definition locations of the symbol at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn definition(
        &self,
        position: EditorPosition,
        token: &CancellationToken,
    ) -> Result<Vec<EditorLocation>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::Definition,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let locations = transport
                        .definition(&session.id, &document(&session), position.to_lsp(), Some(&meta))
                        .await?;
                    Ok(convert::editor_locations(&locations))
                },
            )
            .await
    }

    /// Implementations of the symbol at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn implementation(
        &self,
        position: EditorPosition,
        token: &CancellationToken,
    ) -> Result<Vec<EditorLocation>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::Implementation,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let locations = transport
                        .implementation(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            Some(&meta),
                        )
                        .await?;
                    Ok(convert::editor_locations(&locations))
                },
            )
            .await
    }

    /// Type definition of the symbol at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn type_definition(
        &self,
        position: EditorPosition,
        token: &CancellationToken,
    ) -> Result<Vec<EditorLocation>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::TypeDefinition,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let locations = transport
                        .type_definition(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            Some(&meta),
                        )
                        .await?;
                    Ok(convert::editor_locations(&locations))
                },
            )
            .await
    }

    /// References to the symbol at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn references(
        &self,
        position: EditorPosition,
        include_declaration: bool,
        token: &CancellationToken,
    ) -> Result<Vec<EditorLocation>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::References,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let locations = transport
                        .references(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            include_declaration,
                            Some(&meta),
                        )
                        .await?;
                    Ok(convert::editor_locations(&locations))
                },
            )
            .await
    }

    /// Renames the symbol at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn rename(
        &self,
        position: EditorPosition,
        new_name: &str,
        token: &CancellationToken,
    ) -> Result<Option<RenameResult>, AdapterError> {
        let transport = self.transport.clone();
        let new_name = new_name.to_string();
        self.lifecycle
            .run_cancelable(
                FeatureKind::Rename,
                token,
                None,
                move |session, meta| async move {
                    let edit = transport
                        .rename(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            &new_name,
                            Some(&meta),
                        )
                        .await?;
                    Ok(edit.map(convert::rename_result))
                },
            )
            .await
    }

    /// Code actions for `range`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn code_actions(
        &self,
        range: EditorRange,
        context: CodeActionContext,
        token: &CancellationToken,
    ) -> Result<Vec<EditorCodeAction>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::CodeActions,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let actions = transport
                        .code_actions(
                            &session.id,
                            &document(&session),
                            range.to_lsp(),
                            context,
                            Some(&meta),
                        )
                        .await?;
                    Ok(actions.into_iter().map(convert::code_action).collect())
                },
            )
            .await
    }

    /// Fills in a lazily-resolved code action from its raw form.
    ///
    /// Actions that already carry edits, bare commands, and calls made
    /// after the session changed come back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn resolve_code_action(
        &self,
        action: &EditorCodeAction,
    ) -> Result<EditorCodeAction, AdapterError> {
        let CodeActionOrCommand::CodeAction(raw) = &action.raw else {
            return Ok(action.clone());
        };
        if !action.needs_resolve() {
            return Ok(action.clone());
        }
        let Some(session) = self.slot.current() else {
            return Ok(action.clone());
        };

        let resolved = self
            .transport
            .resolve_code_action(&session.id, raw.clone())
            .await
            .map_err(|e| direct_error(FeatureKind::CodeActions.as_str(), &e))?;

        if !self.slot.is_current(&session) {
            return Ok(action.clone());
        }
        Ok(convert::code_action(CodeActionOrCommand::CodeAction(resolved)))
    }

    /// Edits that format the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn format_document(
        &self,
        options: FormattingOptions,
        token: &CancellationToken,
    ) -> Result<Vec<EditorTextEdit>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::Formatting,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let edits = transport
                        .format_document(&session.id, &document(&session), options, Some(&meta))
                        .await?;
                    Ok(edits.iter().map(convert::text_edit).collect())
                },
            )
            .await
    }

    /// Symbol outline of the document. The editor offers no token for
    /// this, so it is a direct call.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn document_symbols(&self) -> Result<Vec<EditorSymbol>, AdapterError> {
        let Some(session) = self.slot.current() else {
            return Ok(Vec::new());
        };

        let response = self
            .transport
            .document_symbols(&session.id, &document(&session), None)
            .await
            .map_err(|e| direct_error(FeatureKind::DocumentSymbols.as_str(), &e))?;

        if !self.slot.is_current(&session) {
            debug!("Dropping document symbols from inactive session");
            return Ok(Vec::new());
        }
        Ok(response
            .as_ref()
            .map(convert::document_symbols)
            .unwrap_or_default())
    }

    /// Workspace-wide symbol search.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn workspace_symbols(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<Vec<EditorSymbolLocation>, AdapterError> {
        let transport = self.transport.clone();
        let query = query.to_string();
        self.lifecycle
            .run_cancelable(
                FeatureKind::WorkspaceSymbols,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let response = transport
                        .workspace_symbols(&session.id, &query, Some(&meta))
                        .await?;
                    Ok(response
                        .as_ref()
                        .map(convert::workspace_symbols)
                        .unwrap_or_default())
                },
            )
            .await
    }

    /// Signature help at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn signature_help(
        &self,
        position: EditorPosition,
        token: &CancellationToken,
    ) -> Result<Option<EditorSignatureHelp>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::SignatureHelp,
                token,
                None,
                move |session, meta| async move {
                    let help = transport
                        .signature_help(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            Some(&meta),
                        )
                        .await?;
                    Ok(help.as_ref().map(convert::signature_help))
                },
            )
            .await
    }

    /// Occurrences of the symbol at `position` in this document.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn document_highlights(
        &self,
        position: EditorPosition,
        token: &CancellationToken,
    ) -> Result<Vec<EditorHighlight>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::DocumentHighlight,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let highlights = transport
                        .document_highlights(
                            &session.id,
                            &document(&session),
                            position.to_lsp(),
                            Some(&meta),
                        )
                        .await?;
                    Ok(convert::highlights(&highlights))
                },
            )
            .await
    }

    /// Inlay hints inside `range`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn inlay_hints(
        &self,
        range: EditorRange,
        token: &CancellationToken,
    ) -> Result<Vec<EditorInlayHint>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::InlayHints,
                token,
                Vec::new(),
                move |session, meta| async move {
                    let hints = transport
                        .inlay_hints(&session.id, &document(&session), range.to_lsp(), Some(&meta))
                        .await?;
                    Ok(convert::inlay_hints(&hints))
                },
            )
            .await
    }

    /// Semantic tokens for the whole document.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn semantic_tokens(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<EditorSemanticTokens>, AdapterError> {
        let transport = self.transport.clone();
        self.lifecycle
            .run_cancelable(
                FeatureKind::SemanticTokens,
                token,
                None,
                move |session, meta| async move {
                    let tokens = transport
                        .semantic_tokens_full(&session.id, &document(&session), Some(&meta))
                        .await?;
                    Ok(tokens.map(convert::semantic_tokens))
                },
            )
            .await
    }

    /// Runs a server command, e.g. one attached to a code action.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the server call fails.
    pub async fn execute_command(
        &self,
        command: &str,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, AdapterError> {
        let Some(session) = self.slot.current() else {
            return Ok(None);
        };

        let result = self
            .transport
            .execute_command(&session.id, command, arguments)
            .await
            .map_err(|e| direct_error("executeCommand", &e))?;

        Ok(result.filter(|_| self.slot.is_current(&session)))
    }
}

/// Registers one provider per enabled feature, in [`FeatureKind::ALL`]
/// order, returning the handles in registration order.
pub fn register_features(
    host: &dyn EditorHost,
    language_id: &str,
    features: &FeatureSupport,
    providers: &Arc<FeatureProviders>,
) -> Vec<Disposable> {
    features
        .enabled()
        .map(|kind| {
            debug!("Registering {} provider", kind.as_str());
            host.register_provider(language_id, kind, providers.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::capabilities::{Capabilities, SyncKind};
    use crate::editor::{MemoryEditor, parse_uri};
    use crate::transport::ScriptedTransport;
    use anyhow::{Context, Result};
    use serde_json::json;

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        slot: Arc<SessionSlot>,
        providers: FeatureProviders,
    }

    fn activate(slot: &SessionSlot) -> Result<()> {
        slot.activate(Arc::new(ActiveSession {
            id: "s-1".to_string(),
            language_id: "typescript".to_string(),
            root_uri: None,
            document_uri: parse_uri("file:///tmp/a.ts")?,
            capabilities: Capabilities::empty(),
            features: FeatureSupport::default(),
            sync_kind: SyncKind::Full,
            generation: slot.next_generation(),
        }));
        Ok(())
    }

    fn fixture() -> Result<Fixture> {
        let transport = Arc::new(ScriptedTransport::new());
        let slot = Arc::new(SessionSlot::default());
        activate(&slot)?;
        let lifecycle = Arc::new(RequestLifecycle::new(slot.clone(), transport.clone()));
        let providers = FeatureProviders::new(lifecycle, slot.clone(), transport.clone());
        Ok(Fixture {
            transport,
            slot,
            providers,
        })
    }

    #[tokio::test]
    async fn hover_is_shaped_and_carries_meta() -> Result<()> {
        let fx = fixture()?;
        fx.transport.reply(
            "hover",
            json!({ "contents": { "kind": "markdown", "value": "**x**: number" } }),
        );

        let hover = fx
            .providers
            .hover(EditorPosition::new(2, 5), &CancellationToken::new())
            .await?
            .context("no hover")?;
        assert_eq!(hover.contents, ["**x**: number"]);

        let call = fx
            .transport
            .calls_to("hover")
            .pop()
            .context("hover not called")?;
        assert_eq!(call.params["position"], json!({ "line": 1, "character": 4 }));
        assert_eq!(call.params["meta"]["timeoutMs"], 10_000);
        assert!(
            call.params["meta"]["clientRequestId"]
                .as_str()
                .is_some_and(|id| id.starts_with("hover:"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn document_symbols_are_direct_calls() -> Result<()> {
        let fx = fixture()?;
        fx.transport.reply("documentSymbols", json!([]));

        let symbols = fx.providers.document_symbols().await?;
        assert!(symbols.is_empty());

        let call = fx
            .transport
            .calls_to("documentSymbols")
            .pop()
            .context("documentSymbols not called")?;
        assert!(call.params["meta"].is_null());
        Ok(())
    }

    #[tokio::test]
    async fn direct_call_failure_names_feature() -> Result<()> {
        let fx = fixture()?;
        fx.transport.fail("documentSymbols", "server crashed");

        let error = fx
            .providers
            .document_symbols()
            .await
            .err()
            .context("expected failure")?;
        assert_eq!(error.to_string(), "[documentSymbols] server crashed");
        Ok(())
    }

    #[tokio::test]
    async fn resolve_round_trips_raw_action() -> Result<()> {
        let fx = fixture()?;
        let lazy: CodeActionOrCommand = serde_json::from_value(json!({
            "title": "Add import",
            "kind": "quickfix",
            "data": { "fix": 3 }
        }))?;
        fx.transport.reply(
            "resolveCodeAction",
            json!({
                "title": "Add import",
                "kind": "quickfix",
                "edit": {
                    "changes": {
                        "file:///tmp/a.ts": [{
                            "range": {
                                "start": { "line": 0, "character": 0 },
                                "end": { "line": 0, "character": 0 }
                            },
                            "newText": "import { x } from './x';\n"
                        }]
                    }
                }
            }),
        );

        let resolved = fx
            .providers
            .resolve_code_action(&convert::code_action(lazy))
            .await?;

        let call = fx
            .transport
            .calls_to("resolveCodeAction")
            .pop()
            .context("resolve not called")?;
        assert_eq!(call.params["action"]["data"], json!({ "fix": 3 }));
        assert_eq!(resolved.edits.len(), 1);
        assert!(!resolved.needs_resolve());
        Ok(())
    }

    #[tokio::test]
    async fn no_session_means_no_calls() -> Result<()> {
        let fx = fixture()?;
        fx.slot.take();

        let locations = fx
            .providers
            .definition(EditorPosition::new(1, 1), &CancellationToken::new())
            .await?;
        assert!(locations.is_empty());
        assert!(fx.providers.execute_command("noop", Vec::new()).await?.is_none());
        assert!(fx.transport.calls().is_empty());
        Ok(())
    }

    #[test]
    fn registers_one_provider_per_enabled_feature() -> Result<()> {
        let fx = fixture()?;
        let editor = MemoryEditor::new(parse_uri("file:///tmp/a.ts")?, "");
        let features = FeatureSupport {
            completion: true,
            hover: true,
            ..FeatureSupport::default()
        };

        let providers = Arc::new(fx.providers);
        let handles = register_features(&editor, "typescript", &features, &providers);
        assert_eq!(handles.len(), 2);
        assert_eq!(
            editor.registered_kinds(),
            [FeatureKind::Completion, FeatureKind::Hover]
        );

        for handle in handles {
            handle.dispose();
        }
        assert_eq!(editor.active_provider_count(), 0);
        Ok(())
    }
}
