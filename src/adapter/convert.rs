// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Shaping of protocol results into editor-native values.
//!
//! Everything here converts 0-based protocol coordinates to the editor's
//! 1-based ones. Shapes that the editor may hand back later (completion
//! items, code actions, rename edits) keep the raw protocol value beside
//! the shaped one.

use lsp_types::{
    CodeActionOrCommand, Command, CompletionItem, CompletionItemKind, CompletionResponse,
    CompletionTextEdit, DocumentChangeOperation, DocumentChanges, DocumentHighlight,
    DocumentHighlightKind, DocumentSymbol, DocumentSymbolResponse, Documentation, Hover,
    HoverContents, InlayHint, InlayHintKind, InlayHintLabel, InsertTextFormat, Location,
    MarkedString, OneOf, ParameterLabel, SemanticTokensResult, SignatureHelp, SymbolInformation,
    SymbolKind, TextDocumentEdit, TextEdit, Uri, WorkspaceEdit, WorkspaceSymbolResponse,
};
use serde::Serialize;

use crate::editor::{EditorPosition, EditorRange};

/// A completion list in editor shape.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorCompletionList {
    /// Suggestions in server order.
    pub suggestions: Vec<CompletionSuggestion>,
    /// The server may return more results for a longer prefix.
    pub incomplete: bool,
}

/// One completion suggestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSuggestion {
    /// Display label.
    pub label: String,
    /// Item kind.
    pub kind: Option<CompletionItemKind>,
    /// Detail line.
    pub detail: Option<String>,
    /// Documentation as markdown or plain text.
    pub documentation: Option<String>,
    /// Text to insert.
    pub insert_text: String,
    /// `insert_text` is a snippet.
    pub is_snippet: bool,
    /// Range the insertion replaces, if the server gave one.
    pub range: Option<EditorRange>,
    /// Sort key.
    pub sort_text: Option<String>,
    /// Filter key.
    pub filter_text: Option<String>,
    /// The item as the server sent it.
    #[serde(skip)]
    pub raw: CompletionItem,
}

/// Hover content as markdown blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverContent {
    /// Markdown blocks.
    pub contents: Vec<String>,
    /// Range the hover applies to.
    pub range: Option<EditorRange>,
}

/// A location in another (or the same) document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorLocation {
    /// Target document.
    pub uri: String,
    /// Target range.
    pub range: EditorRange,
}

/// A single-document text edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorTextEdit {
    /// Range to replace.
    pub range: EditorRange,
    /// Replacement text.
    pub text: String,
}

/// A text edit tagged with the document it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorResourceEdit {
    /// Document to edit.
    pub uri: String,
    /// Optional document version the edit was computed against.
    pub version: Option<i32>,
    /// The edit.
    #[serde(flatten)]
    pub edit: EditorTextEdit,
}

/// A code action in editor shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorCodeAction {
    /// Title shown in the menu.
    pub title: String,
    /// Action kind (e.g. `quickfix`).
    pub kind: Option<String>,
    /// Preferred action for auto-fix.
    pub is_preferred: bool,
    /// Why the action is disabled, if it is.
    pub disabled: Option<String>,
    /// Edits carried by the action. Empty until resolved for lazy servers.
    pub edits: Vec<EditorResourceEdit>,
    /// Command to run after the edits.
    pub command: Option<Command>,
    /// The action as the server sent it.
    #[serde(skip)]
    pub raw: CodeActionOrCommand,
}

impl EditorCodeAction {
    /// Whether the edit is missing and the server can supply it.
    #[must_use]
    pub fn needs_resolve(&self) -> bool {
        matches!(&self.raw, CodeActionOrCommand::CodeAction(action) if action.edit.is_none())
    }
}

/// A rename result in editor shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameResult {
    /// Edits across the workspace.
    pub edits: Vec<EditorResourceEdit>,
    /// The edit as the server sent it.
    #[serde(skip)]
    pub raw: WorkspaceEdit,
}

/// A document symbol, possibly with children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSymbol {
    /// Symbol name.
    pub name: String,
    /// Extra detail, e.g. a signature.
    pub detail: Option<String>,
    /// Symbol kind.
    pub kind: SymbolKind,
    /// Full extent of the symbol.
    pub range: EditorRange,
    /// Extent of the symbol's name.
    pub selection_range: EditorRange,
    /// Enclosing symbol name, for flat responses.
    pub container_name: Option<String>,
    /// Nested symbols.
    pub children: Vec<Self>,
}

/// A workspace symbol match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSymbolLocation {
    /// Symbol name.
    pub name: String,
    /// Symbol kind.
    pub kind: SymbolKind,
    /// Enclosing symbol name.
    pub container_name: Option<String>,
    /// Document containing the symbol.
    pub uri: String,
    /// Range, when the server resolved one.
    pub range: Option<EditorRange>,
}

/// A document highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorHighlight {
    /// Highlighted range.
    pub range: EditorRange,
    /// Read, write or text.
    pub kind: Option<DocumentHighlightKind>,
}

/// An inlay hint with its label flattened to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorInlayHint {
    /// Where the hint is drawn.
    pub position: EditorPosition,
    /// Hint text.
    pub label: String,
    /// Type or parameter hint.
    pub kind: Option<InlayHintKind>,
    /// Pad before the hint.
    pub padding_left: bool,
    /// Pad after the hint.
    pub padding_right: bool,
}

/// Semantic tokens as the flat relative-encoded array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSemanticTokens {
    /// Server id for delta requests.
    pub result_id: Option<String>,
    /// Five integers per token.
    pub data: Vec<u32>,
}

/// Signature help in editor shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSignatureHelp {
    /// Candidate signatures.
    pub signatures: Vec<EditorSignature>,
    /// Index of the active signature.
    pub active_signature: u32,
    /// Index of the active parameter.
    pub active_parameter: u32,
}

/// One signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSignature {
    /// Full signature label.
    pub label: String,
    /// Documentation.
    pub documentation: Option<String>,
    /// Parameter labels.
    pub parameters: Vec<String>,
}

fn uri_string(uri: &Uri) -> String {
    uri.as_str().to_string()
}

fn documentation_text(documentation: &Documentation) -> String {
    match documentation {
        Documentation::String(text) => text.clone(),
        Documentation::MarkupContent(markup) => markup.value.clone(),
    }
}

/// Shapes a completion response.
#[must_use]
pub fn completion_list(response: CompletionResponse) -> EditorCompletionList {
    let (items, incomplete) = match response {
        CompletionResponse::Array(items) => (items, false),
        CompletionResponse::List(list) => (list.items, list.is_incomplete),
    };
    EditorCompletionList {
        suggestions: items.into_iter().map(completion_suggestion).collect(),
        incomplete,
    }
}

/// Shapes one completion item, keeping the raw item.
#[must_use]
pub fn completion_suggestion(item: CompletionItem) -> CompletionSuggestion {
    let (range, edit_text) = match &item.text_edit {
        Some(CompletionTextEdit::Edit(edit)) => {
            (Some(EditorRange::from_lsp(&edit.range)), Some(&edit.new_text))
        }
        Some(CompletionTextEdit::InsertAndReplace(edit)) => (
            Some(EditorRange::from_lsp(&edit.replace)),
            Some(&edit.new_text),
        ),
        None => (None, None),
    };
    let insert_text = edit_text
        .or(item.insert_text.as_ref())
        .unwrap_or(&item.label)
        .clone();

    CompletionSuggestion {
        label: item.label.clone(),
        kind: item.kind,
        detail: item.detail.clone(),
        documentation: item.documentation.as_ref().map(documentation_text),
        insert_text,
        is_snippet: item.insert_text_format == Some(InsertTextFormat::SNIPPET),
        range,
        sort_text: item.sort_text.clone(),
        filter_text: item.filter_text.clone(),
        raw: item,
    }
}

fn marked_string_markdown(marked: &MarkedString) -> String {
    match marked {
        MarkedString::String(text) => text.clone(),
        MarkedString::LanguageString(block) => {
            format!("```{}\n{}\n```", block.language, block.value)
        }
    }
}

/// Shapes a hover.
#[must_use]
pub fn hover_content(hover: &Hover) -> HoverContent {
    let contents = match &hover.contents {
        HoverContents::Scalar(marked) => vec![marked_string_markdown(marked)],
        HoverContents::Array(blocks) => blocks.iter().map(marked_string_markdown).collect(),
        HoverContents::Markup(markup) => vec![markup.value.clone()],
    };
    HoverContent {
        contents: contents.into_iter().filter(|c| !c.is_empty()).collect(),
        range: hover.range.as_ref().map(EditorRange::from_lsp),
    }
}

/// Shapes a location.
#[must_use]
pub fn editor_location(location: &Location) -> EditorLocation {
    EditorLocation {
        uri: uri_string(&location.uri),
        range: EditorRange::from_lsp(&location.range),
    }
}

/// Shapes a list of locations.
#[must_use]
pub fn editor_locations(locations: &[Location]) -> Vec<EditorLocation> {
    locations.iter().map(editor_location).collect()
}

/// Shapes a single-document edit.
#[must_use]
pub fn text_edit(edit: &TextEdit) -> EditorTextEdit {
    EditorTextEdit {
        range: EditorRange::from_lsp(&edit.range),
        text: edit.new_text.clone(),
    }
}

fn document_edits(edit: &TextDocumentEdit, out: &mut Vec<EditorResourceEdit>) {
    let uri = uri_string(&edit.text_document.uri);
    for entry in &edit.edits {
        let plain = match entry {
            OneOf::Left(plain) => plain,
            OneOf::Right(annotated) => &annotated.text_edit,
        };
        out.push(EditorResourceEdit {
            uri: uri.clone(),
            version: edit.text_document.version,
            edit: text_edit(plain),
        });
    }
}

/// Flattens a workspace edit into per-document text edits.
///
/// File operations (create, rename, delete) carry no text and are skipped.
#[must_use]
pub fn workspace_edit_to_edits(edit: &WorkspaceEdit) -> Vec<EditorResourceEdit> {
    let mut out = Vec::new();

    if let Some(changes) = &edit.changes {
        let mut uris: Vec<&Uri> = changes.keys().collect();
        uris.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for uri in uris {
            for change in changes.get(uri).into_iter().flatten() {
                out.push(EditorResourceEdit {
                    uri: uri_string(uri),
                    version: None,
                    edit: text_edit(change),
                });
            }
        }
    }

    match &edit.document_changes {
        Some(DocumentChanges::Edits(edits)) => {
            for document in edits {
                document_edits(document, &mut out);
            }
        }
        Some(DocumentChanges::Operations(operations)) => {
            for operation in operations {
                if let DocumentChangeOperation::Edit(document) = operation {
                    document_edits(document, &mut out);
                }
            }
        }
        None => {}
    }

    out
}

/// Shapes a code action or bare command, keeping the raw value.
#[must_use]
pub fn code_action(raw: CodeActionOrCommand) -> EditorCodeAction {
    match &raw {
        CodeActionOrCommand::Command(command) => EditorCodeAction {
            title: command.title.clone(),
            kind: None,
            is_preferred: false,
            disabled: None,
            edits: Vec::new(),
            command: Some(command.clone()),
            raw,
        },
        CodeActionOrCommand::CodeAction(action) => EditorCodeAction {
            title: action.title.clone(),
            kind: action.kind.as_ref().map(|k| k.as_str().to_string()),
            is_preferred: action.is_preferred.unwrap_or(false),
            disabled: action.disabled.as_ref().map(|d| d.reason.clone()),
            edits: action
                .edit
                .as_ref()
                .map(workspace_edit_to_edits)
                .unwrap_or_default(),
            command: action.command.clone(),
            raw,
        },
    }
}

/// Shapes a rename edit, keeping the raw value.
#[must_use]
pub fn rename_result(raw: WorkspaceEdit) -> RenameResult {
    RenameResult {
        edits: workspace_edit_to_edits(&raw),
        raw,
    }
}

fn nested_symbol(symbol: &DocumentSymbol) -> EditorSymbol {
    EditorSymbol {
        name: symbol.name.clone(),
        detail: symbol.detail.clone(),
        kind: symbol.kind,
        range: EditorRange::from_lsp(&symbol.range),
        selection_range: EditorRange::from_lsp(&symbol.selection_range),
        container_name: None,
        children: symbol
            .children
            .iter()
            .flatten()
            .map(nested_symbol)
            .collect(),
    }
}

fn flat_symbol(symbol: &SymbolInformation) -> EditorSymbol {
    let range = EditorRange::from_lsp(&symbol.location.range);
    EditorSymbol {
        name: symbol.name.clone(),
        detail: None,
        kind: symbol.kind,
        range,
        selection_range: range,
        container_name: symbol.container_name.clone(),
        children: Vec::new(),
    }
}

/// Shapes a document symbol response into a tree.
#[must_use]
pub fn document_symbols(response: &DocumentSymbolResponse) -> Vec<EditorSymbol> {
    match response {
        DocumentSymbolResponse::Nested(symbols) => symbols.iter().map(nested_symbol).collect(),
        DocumentSymbolResponse::Flat(symbols) => symbols.iter().map(flat_symbol).collect(),
    }
}

/// Shapes a workspace symbol response.
#[must_use]
pub fn workspace_symbols(response: &WorkspaceSymbolResponse) -> Vec<EditorSymbolLocation> {
    match response {
        WorkspaceSymbolResponse::Flat(symbols) => symbols
            .iter()
            .map(|symbol| EditorSymbolLocation {
                name: symbol.name.clone(),
                kind: symbol.kind,
                container_name: symbol.container_name.clone(),
                uri: uri_string(&symbol.location.uri),
                range: Some(EditorRange::from_lsp(&symbol.location.range)),
            })
            .collect(),
        WorkspaceSymbolResponse::Nested(symbols) => symbols
            .iter()
            .map(|symbol| {
                let (uri, range) = match &symbol.location {
                    OneOf::Left(location) => (
                        uri_string(&location.uri),
                        Some(EditorRange::from_lsp(&location.range)),
                    ),
                    OneOf::Right(partial) => (uri_string(&partial.uri), None),
                };
                EditorSymbolLocation {
                    name: symbol.name.clone(),
                    kind: symbol.kind,
                    container_name: symbol.container_name.clone(),
                    uri,
                    range,
                }
            })
            .collect(),
    }
}

/// Shapes document highlights.
#[must_use]
pub fn highlights(highlights: &[DocumentHighlight]) -> Vec<EditorHighlight> {
    highlights
        .iter()
        .map(|highlight| EditorHighlight {
            range: EditorRange::from_lsp(&highlight.range),
            kind: highlight.kind,
        })
        .collect()
}

/// Shapes inlay hints, concatenating label parts.
#[must_use]
pub fn inlay_hints(hints: &[InlayHint]) -> Vec<EditorInlayHint> {
    hints
        .iter()
        .map(|hint| EditorInlayHint {
            position: EditorPosition::from_lsp(hint.position),
            label: match &hint.label {
                InlayHintLabel::String(text) => text.clone(),
                InlayHintLabel::LabelParts(parts) => {
                    parts.iter().map(|part| part.value.as_str()).collect()
                }
            },
            kind: hint.kind,
            padding_left: hint.padding_left.unwrap_or(false),
            padding_right: hint.padding_right.unwrap_or(false),
        })
        .collect()
}

/// Flattens semantic tokens to the relative-encoded integer array.
#[must_use]
pub fn semantic_tokens(result: SemanticTokensResult) -> EditorSemanticTokens {
    let (result_id, tokens) = match result {
        SemanticTokensResult::Tokens(tokens) => (tokens.result_id, tokens.data),
        SemanticTokensResult::Partial(partial) => (None, partial.data),
    };
    EditorSemanticTokens {
        result_id,
        data: tokens
            .iter()
            .flat_map(|token| {
                [
                    token.delta_line,
                    token.delta_start,
                    token.length,
                    token.token_type,
                    token.token_modifiers_bitset,
                ]
            })
            .collect(),
    }
}

/// Shapes signature help.
#[must_use]
pub fn signature_help(help: &SignatureHelp) -> EditorSignatureHelp {
    let signatures = help
        .signatures
        .iter()
        .map(|signature| EditorSignature {
            label: signature.label.clone(),
            documentation: signature.documentation.as_ref().map(documentation_text),
            parameters: signature
                .parameters
                .iter()
                .flatten()
                .map(|parameter| match &parameter.label {
                    ParameterLabel::Simple(label) => label.clone(),
                    ParameterLabel::LabelOffsets([start, end]) => signature
                        .label
                        .chars()
                        .skip(*start as usize)
                        .take(end.saturating_sub(*start) as usize)
                        .collect(),
                })
                .collect(),
        })
        .collect();

    EditorSignatureHelp {
        signatures,
        active_signature: help.active_signature.unwrap_or(0),
        active_parameter: help.active_parameter.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use serde_json::json;

    #[test]
    fn completion_prefers_text_edit_over_insert_text() -> Result<()> {
        let response: CompletionResponse = serde_json::from_value(json!({
            "isIncomplete": true,
            "items": [{
                "label": "log",
                "insertText": "ignored",
                "insertTextFormat": 2,
                "textEdit": {
                    "range": {
                        "start": { "line": 0, "character": 8 },
                        "end": { "line": 0, "character": 9 }
                    },
                    "newText": "log($1)"
                }
            }]
        }))?;

        let list = completion_list(response);
        assert!(list.incomplete);
        let suggestion = list.suggestions.first().context("no suggestion")?;
        assert_eq!(suggestion.insert_text, "log($1)");
        assert!(suggestion.is_snippet);
        assert_eq!(suggestion.range, Some(EditorRange::new(1, 9, 1, 10)));
        assert_eq!(suggestion.raw.label, "log");
        Ok(())
    }

    #[test]
    fn completion_falls_back_to_label() -> Result<()> {
        let response: CompletionResponse = serde_json::from_value(json!([{ "label": "push" }]))?;
        let list = completion_list(response);
        assert_eq!(list.suggestions[0].insert_text, "push");
        assert!(!list.incomplete);
        Ok(())
    }

    #[test]
    fn hover_language_strings_become_fenced_blocks() -> Result<()> {
        let hover: Hover = serde_json::from_value(json!({
            "contents": [
                { "language": "typescript", "value": "const x: number" },
                "A counter."
            ]
        }))?;
        let content = hover_content(&hover);
        assert_eq!(
            content.contents,
            ["```typescript\nconst x: number\n```", "A counter."]
        );
        assert_eq!(content.range, None);
        Ok(())
    }

    #[test]
    fn workspace_edit_flattens_changes_and_document_changes() -> Result<()> {
        let edit: WorkspaceEdit = serde_json::from_value(json!({
            "changes": {
                "file:///b.ts": [{
                    "range": {
                        "start": { "line": 0, "character": 0 },
                        "end": { "line": 0, "character": 3 }
                    },
                    "newText": "bar"
                }]
            },
            "documentChanges": [
                { "kind": "create", "uri": "file:///new.ts" },
                {
                    "textDocument": { "uri": "file:///a.ts", "version": 4 },
                    "edits": [{
                        "range": {
                            "start": { "line": 2, "character": 1 },
                            "end": { "line": 2, "character": 4 }
                        },
                        "newText": "baz",
                        "annotationId": "rename"
                    }]
                }
            ]
        }))?;

        let edits = workspace_edit_to_edits(&edit);
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].uri, "file:///b.ts");
        assert_eq!(edits[1].uri, "file:///a.ts");
        assert_eq!(edits[1].version, Some(4));
        assert_eq!(edits[1].edit.range, EditorRange::new(3, 2, 3, 5));
        assert_eq!(edits[1].edit.text, "baz");
        Ok(())
    }

    #[test]
    fn lazy_code_action_needs_resolve() -> Result<()> {
        let raw: CodeActionOrCommand = serde_json::from_value(json!({
            "title": "Add missing import",
            "kind": "quickfix",
            "isPreferred": true,
            "data": { "id": 7 }
        }))?;

        let action = code_action(raw);
        assert_eq!(action.kind.as_deref(), Some("quickfix"));
        assert!(action.is_preferred);
        assert!(action.edits.is_empty());
        assert!(action.needs_resolve());
        Ok(())
    }

    #[test]
    fn bare_command_is_not_resolvable() -> Result<()> {
        let raw: CodeActionOrCommand = serde_json::from_value(json!({
            "title": "Organize imports",
            "command": "_typescript.organizeImports"
        }))?;
        let action = code_action(raw);
        assert!(!action.needs_resolve());
        assert_eq!(
            action.command.map(|c| c.command).as_deref(),
            Some("_typescript.organizeImports")
        );
        Ok(())
    }

    #[test]
    fn nested_symbols_keep_hierarchy() -> Result<()> {
        let response: DocumentSymbolResponse = serde_json::from_value(json!([{
            "name": "Greeter",
            "kind": 5,
            "range": {
                "start": { "line": 0, "character": 0 },
                "end": { "line": 9, "character": 1 }
            },
            "selectionRange": {
                "start": { "line": 0, "character": 6 },
                "end": { "line": 0, "character": 13 }
            },
            "children": [{
                "name": "greet",
                "kind": 6,
                "range": {
                    "start": { "line": 2, "character": 2 },
                    "end": { "line": 4, "character": 3 }
                },
                "selectionRange": {
                    "start": { "line": 2, "character": 2 },
                    "end": { "line": 2, "character": 7 }
                }
            }]
        }]))?;

        let symbols = document_symbols(&response);
        let class = symbols.first().context("no symbol")?;
        assert_eq!(class.kind, SymbolKind::CLASS);
        assert_eq!(class.selection_range, EditorRange::new(1, 7, 1, 14));
        assert_eq!(class.children.len(), 1);
        assert_eq!(class.children[0].name, "greet");
        Ok(())
    }

    #[test]
    fn inlay_label_parts_are_joined() -> Result<()> {
        let hints: Vec<InlayHint> = serde_json::from_value(json!([{
            "position": { "line": 3, "character": 10 },
            "label": [{ "value": ": " }, { "value": "number" }],
            "kind": 1,
            "paddingLeft": true
        }]))?;

        let shaped = inlay_hints(&hints);
        assert_eq!(shaped[0].label, ": number");
        assert_eq!(shaped[0].position, EditorPosition::new(4, 11));
        assert!(shaped[0].padding_left);
        assert!(!shaped[0].padding_right);
        Ok(())
    }

    #[test]
    fn semantic_tokens_stay_flat() -> Result<()> {
        let result: SemanticTokensResult = serde_json::from_value(json!({
            "resultId": "1",
            "data": [0, 4, 3, 1, 0, 1, 2, 5, 2, 1]
        }))?;
        let tokens = semantic_tokens(result);
        assert_eq!(tokens.result_id.as_deref(), Some("1"));
        assert_eq!(tokens.data, [0, 4, 3, 1, 0, 1, 2, 5, 2, 1]);
        Ok(())
    }

    #[test]
    fn signature_parameters_resolve_offsets() -> Result<()> {
        let help: SignatureHelp = serde_json::from_value(json!({
            "signatures": [{
                "label": "add(a: number, b: number)",
                "parameters": [
                    { "label": [4, 13] },
                    { "label": "b: number" }
                ]
            }],
            "activeParameter": 1
        }))?;
        let shaped = signature_help(&help);
        assert_eq!(shaped.signatures[0].parameters, ["a: number", "b: number"]);
        assert_eq!(shaped.active_parameter, 1);
        assert_eq!(shaped.active_signature, 0);
        Ok(())
    }
}
