// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Capability resolution.
//!
//! A server advertises each feature as absent, `false`, `true`, or an
//! options object. [`is_advertised`] is the single predicate that decides
//! what counts as support; everything else in the crate reads the
//! resulting [`FeatureSupport`].

use lsp_types::TextDocumentSyncKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Timeout for position-scoped queries.
pub const POSITION_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for workspace-wide symbol search.
pub const WORKSPACE_SYMBOL_TIMEOUT: Duration = Duration::from_secs(15);

/// The raw `capabilities` object from the server's `initialize` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(Value);

impl Capabilities {
    /// Wraps a raw capability record.
    #[must_use]
    pub const fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// An empty record, as reported before a session exists.
    #[must_use]
    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    /// Looks up a top-level capability entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the raw record.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.0
    }
}

/// Returns true when a capability entry means "supported".
///
/// Absent, `null` and `false` mean unsupported; `true` and any descriptor
/// object (even an empty one) mean supported.
#[must_use]
pub const fn is_advertised(entry: Option<&Value>) -> bool {
    !matches!(entry, None | Some(Value::Null | Value::Bool(false)))
}

/// One logical editor feature backed by an LSP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    /// `textDocument/completion`
    Completion,
    /// `textDocument/hover`
    Hover,
    /// `textDocument/definition`
    Definition,
    /// `textDocument/references`
    References,
    /// `textDocument/rename`
    Rename,
    /// `textDocument/implementation`
    Implementation,
    /// `textDocument/typeDefinition`
    TypeDefinition,
    /// `textDocument/signatureHelp`
    SignatureHelp,
    /// `textDocument/documentHighlight`
    DocumentHighlight,
    /// `textDocument/documentSymbol`
    DocumentSymbols,
    /// `textDocument/codeAction`
    CodeActions,
    /// `textDocument/formatting`
    Formatting,
    /// `workspace/symbol`
    WorkspaceSymbols,
    /// `textDocument/inlayHint`
    InlayHints,
    /// `textDocument/semanticTokens/full`
    SemanticTokens,
}

impl FeatureKind {
    /// Every feature, in registration order.
    pub const ALL: [Self; 15] = [
        Self::Completion,
        Self::Hover,
        Self::Definition,
        Self::References,
        Self::Rename,
        Self::Implementation,
        Self::TypeDefinition,
        Self::SignatureHelp,
        Self::DocumentHighlight,
        Self::DocumentSymbols,
        Self::CodeActions,
        Self::Formatting,
        Self::WorkspaceSymbols,
        Self::InlayHints,
        Self::SemanticTokens,
    ];

    /// Stable key used in request ids and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Hover => "hover",
            Self::Definition => "definition",
            Self::References => "references",
            Self::Rename => "rename",
            Self::Implementation => "implementation",
            Self::TypeDefinition => "typeDefinition",
            Self::SignatureHelp => "signatureHelp",
            Self::DocumentHighlight => "documentHighlight",
            Self::DocumentSymbols => "documentSymbols",
            Self::CodeActions => "codeActions",
            Self::Formatting => "formatting",
            Self::WorkspaceSymbols => "workspaceSymbols",
            Self::InlayHints => "inlayHints",
            Self::SemanticTokens => "semanticTokens",
        }
    }

    /// The server capability entry that advertises this feature.
    #[must_use]
    pub const fn capability_key(self) -> &'static str {
        match self {
            Self::Completion => "completionProvider",
            Self::Hover => "hoverProvider",
            Self::Definition => "definitionProvider",
            Self::References => "referencesProvider",
            Self::Rename => "renameProvider",
            Self::Implementation => "implementationProvider",
            Self::TypeDefinition => "typeDefinitionProvider",
            Self::SignatureHelp => "signatureHelpProvider",
            Self::DocumentHighlight => "documentHighlightProvider",
            Self::DocumentSymbols => "documentSymbolProvider",
            Self::CodeActions => "codeActionProvider",
            Self::Formatting => "documentFormattingProvider",
            Self::WorkspaceSymbols => "workspaceSymbolProvider",
            Self::InlayHints => "inlayHintProvider",
            Self::SemanticTokens => "semanticTokensProvider",
        }
    }

    /// Newer features that sit behind `extended_features_enabled`.
    #[must_use]
    pub const fn is_extended(self) -> bool {
        matches!(
            self,
            Self::Rename
                | Self::Implementation
                | Self::TypeDefinition
                | Self::DocumentHighlight
                | Self::InlayHints
                | Self::SemanticTokens
        )
    }

    /// Fixed request timeout for this feature.
    #[must_use]
    pub const fn request_timeout(self) -> Duration {
        match self {
            Self::WorkspaceSymbols => WORKSPACE_SYMBOL_TIMEOUT,
            _ => POSITION_REQUEST_TIMEOUT,
        }
    }
}

/// Which features the current session supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(
    clippy::struct_excessive_bools,
    reason = "One flag per protocol feature"
)]
pub struct FeatureSupport {
    /// Completion.
    pub completion: bool,
    /// Hover.
    pub hover: bool,
    /// Go to definition.
    pub definition: bool,
    /// Find references.
    pub references: bool,
    /// Rename.
    pub rename: bool,
    /// Go to implementation.
    pub implementation: bool,
    /// Go to type definition.
    pub type_definition: bool,
    /// Signature help.
    pub signature_help: bool,
    /// Document highlights.
    pub document_highlight: bool,
    /// Document symbols.
    pub document_symbols: bool,
    /// Code actions.
    pub code_actions: bool,
    /// Whole-document formatting.
    pub formatting: bool,
    /// Workspace symbol search.
    pub workspace_symbols: bool,
    /// Inlay hints.
    pub inlay_hints: bool,
    /// Full semantic tokens.
    pub semantic_tokens: bool,
}

impl FeatureSupport {
    /// Returns the flag for `kind`.
    #[must_use]
    pub const fn is_enabled(&self, kind: FeatureKind) -> bool {
        match kind {
            FeatureKind::Completion => self.completion,
            FeatureKind::Hover => self.hover,
            FeatureKind::Definition => self.definition,
            FeatureKind::References => self.references,
            FeatureKind::Rename => self.rename,
            FeatureKind::Implementation => self.implementation,
            FeatureKind::TypeDefinition => self.type_definition,
            FeatureKind::SignatureHelp => self.signature_help,
            FeatureKind::DocumentHighlight => self.document_highlight,
            FeatureKind::DocumentSymbols => self.document_symbols,
            FeatureKind::CodeActions => self.code_actions,
            FeatureKind::Formatting => self.formatting,
            FeatureKind::WorkspaceSymbols => self.workspace_symbols,
            FeatureKind::InlayHints => self.inlay_hints,
            FeatureKind::SemanticTokens => self.semantic_tokens,
        }
    }

    const fn set(&mut self, kind: FeatureKind, enabled: bool) {
        let flag = match kind {
            FeatureKind::Completion => &mut self.completion,
            FeatureKind::Hover => &mut self.hover,
            FeatureKind::Definition => &mut self.definition,
            FeatureKind::References => &mut self.references,
            FeatureKind::Rename => &mut self.rename,
            FeatureKind::Implementation => &mut self.implementation,
            FeatureKind::TypeDefinition => &mut self.type_definition,
            FeatureKind::SignatureHelp => &mut self.signature_help,
            FeatureKind::DocumentHighlight => &mut self.document_highlight,
            FeatureKind::DocumentSymbols => &mut self.document_symbols,
            FeatureKind::CodeActions => &mut self.code_actions,
            FeatureKind::Formatting => &mut self.formatting,
            FeatureKind::WorkspaceSymbols => &mut self.workspace_symbols,
            FeatureKind::InlayHints => &mut self.inlay_hints,
            FeatureKind::SemanticTokens => &mut self.semantic_tokens,
        };
        *flag = enabled;
    }

    /// Enabled features, in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = FeatureKind> + '_ {
        FeatureKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
    }

    /// Clears extended features unless they are allowed.
    #[must_use]
    pub fn gated(mut self, extended_features_enabled: bool) -> Self {
        if !extended_features_enabled {
            for kind in FeatureKind::ALL.into_iter().filter(|k| k.is_extended()) {
                self.set(kind, false);
            }
        }
        self
    }
}

/// How document changes are sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Resend the whole document on every change.
    Full,
    /// Send only the changed ranges.
    Incremental,
}

/// Derives feature flags from a capability record.
#[must_use]
pub fn resolve_feature_support(capabilities: &Capabilities) -> FeatureSupport {
    let mut support = FeatureSupport::default();
    for kind in FeatureKind::ALL {
        support.set(kind, is_advertised(capabilities.get(kind.capability_key())));
    }
    support
}

/// Picks the document sync mode.
///
/// Only an explicit incremental code selects [`SyncKind::Incremental`];
/// full, none, missing and unrecognised descriptors all resolve to
/// [`SyncKind::Full`].
#[must_use]
pub fn resolve_sync_kind(capabilities: &Capabilities, protocol_v2_enabled: bool) -> SyncKind {
    if !protocol_v2_enabled {
        return SyncKind::Full;
    }

    let code = match capabilities.get("textDocumentSync") {
        Some(Value::Object(options)) => options.get("change"),
        other => other,
    };

    let kind = code.and_then(|c| serde_json::from_value::<TextDocumentSyncKind>(c.clone()).ok());
    if kind == Some(TextDocumentSyncKind::INCREMENTAL) {
        SyncKind::Incremental
    } else {
        SyncKind::Full
    }
}
