// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Editor-side contract consumed by the adapter.
//!
//! Editor coordinates are 1-based (line number and column), protocol
//! coordinates are 0-based. Conversions live on the coordinate types so
//! the rest of the crate never does `+ 1` arithmetic by hand.

/// Headless in-memory editor.
mod memory;

pub use memory::MemoryEditor;

use anyhow::{Result, anyhow};
use lsp_types::{Position, Range, TextDocumentContentChangeEvent, Uri};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::adapter::{FeatureKind, FeatureProviders};
use crate::disposable::Disposable;

/// Parses a document URI.
///
/// # Errors
///
/// Returns an error if `value` is not a valid URI.
pub fn parse_uri(value: &str) -> Result<Uri> {
    value
        .parse()
        .map_err(|e| anyhow!("Invalid URI {value:?}: {e}"))
}

/// Builds a `file://` URI for an absolute path.
///
/// # Errors
///
/// Returns an error if the path is relative or not representable as a URL.
pub fn uri_from_path(path: &Path) -> Result<Uri> {
    let url = url::Url::from_file_path(path)
        .map_err(|()| anyhow!("Path is not absolute: {}", path.display()))?;
    parse_uri(url.as_str())
}

/// A 1-based position in an editor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorPosition {
    /// 1-based line number.
    pub line_number: u32,
    /// 1-based column.
    pub column: u32,
}

impl EditorPosition {
    /// Creates a position.
    #[must_use]
    pub const fn new(line_number: u32, column: u32) -> Self {
        Self {
            line_number,
            column,
        }
    }

    /// Converts to a protocol position.
    #[must_use]
    pub const fn to_lsp(self) -> Position {
        Position {
            line: self.line_number.saturating_sub(1),
            character: self.column.saturating_sub(1),
        }
    }

    /// Converts from a protocol position.
    #[must_use]
    pub const fn from_lsp(position: Position) -> Self {
        Self {
            line_number: position.line.saturating_add(1),
            column: position.character.saturating_add(1),
        }
    }
}

/// A 1-based range in an editor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorRange {
    /// 1-based start line.
    pub start_line_number: u32,
    /// 1-based start column.
    pub start_column: u32,
    /// 1-based end line.
    pub end_line_number: u32,
    /// 1-based end column.
    pub end_column: u32,
}

impl EditorRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(
        start_line_number: u32,
        start_column: u32,
        end_line_number: u32,
        end_column: u32,
    ) -> Self {
        Self {
            start_line_number,
            start_column,
            end_line_number,
            end_column,
        }
    }

    /// Start of the range.
    #[must_use]
    pub const fn start(&self) -> EditorPosition {
        EditorPosition::new(self.start_line_number, self.start_column)
    }

    /// End of the range.
    #[must_use]
    pub const fn end(&self) -> EditorPosition {
        EditorPosition::new(self.end_line_number, self.end_column)
    }

    /// Converts to a protocol range.
    #[must_use]
    pub const fn to_lsp(&self) -> Range {
        Range {
            start: self.start().to_lsp(),
            end: self.end().to_lsp(),
        }
    }

    /// Converts from a protocol range.
    #[must_use]
    pub const fn from_lsp(range: &Range) -> Self {
        let start = EditorPosition::from_lsp(range.start);
        let end = EditorPosition::from_lsp(range.end);
        Self::new(start.line_number, start.column, end.line_number, end.column)
    }
}

/// One minimal edit reported by the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferChange {
    /// The replaced range, in pre-edit coordinates.
    pub range: EditorRange,
    /// Length of the replaced text in UTF-16 code units.
    pub range_length: u32,
    /// The inserted text.
    pub text: String,
}

impl BufferChange {
    /// Converts to an incremental protocol change.
    #[must_use]
    pub fn to_content_change(&self) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(self.range.to_lsp()),
            range_length: Some(self.range_length),
            text: self.text.clone(),
        }
    }
}

/// Payload of a buffer change notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferChangeEvent {
    /// Edits in the order the buffer applied them.
    pub changes: Vec<BufferChange>,
}

/// Listener invoked synchronously from the buffer's change event.
pub type ChangeListener = Arc<dyn Fn(&BufferChangeEvent) + Send + Sync>;

/// Marker severities, ordered like the editor's own ordinal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSeverity {
    /// Lowest.
    Hint = 1,
    /// Informational.
    Info = 2,
    /// Warning.
    Warning = 4,
    /// Highest.
    Error = 8,
}

/// A diagnostic decoration in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    /// Severity ordinal.
    pub severity: MarkerSeverity,
    /// Human-readable message.
    pub message: String,
    /// Producer of the diagnostic (e.g. "tsc").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Diagnostic code, stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Range the marker covers.
    #[serde(flatten)]
    pub range: EditorRange,
}

/// The text buffer the adapter is bound to.
pub trait BufferModel: Send + Sync {
    /// The document URI.
    fn uri(&self) -> Uri;

    /// The current full text.
    fn text(&self) -> String;

    /// Subscribes to change events. The listener runs synchronously on the
    /// editor's thread and must not block.
    fn on_did_change(&self, listener: ChangeListener) -> Disposable;
}

/// Registration and decoration surface of the editor.
pub trait EditorHost: Send + Sync {
    /// Registers one provider of the given kind for a language.
    fn register_provider(
        &self,
        language_id: &str,
        kind: FeatureKind,
        provider: Arc<FeatureProviders>,
    ) -> Disposable;

    /// Registers a command the editor can invoke (e.g. from a code action).
    fn register_command(&self, command_id: &str, provider: Arc<FeatureProviders>) -> Disposable;

    /// Replaces the full marker set for `uri` under `owner`.
    fn set_markers(&self, uri: &Uri, owner: &str, markers: Vec<Marker>);
}
