// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A configurable mock LSP server for testing.
//!
//! Speaks the LSP protocol over stdin/stdout using Content-Length framed
//! JSON-RPC. CLI flags control capabilities, timing, and failure modes.
//! Documents are tracked through full and incremental sync, and every
//! `TODO` in a document is published as a versioned warning.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Mock LSP server for integration testing.
#[derive(Parser, Debug, Default)]
#[command(name = "mockls")]
struct Args {
    /// Advertise exactly this capabilities object (JSON) instead of the
    /// built-in set.
    #[arg(long)]
    capabilities: Option<String>,

    /// Advertise full document sync instead of incremental.
    #[arg(long)]
    no_incremental: bool,

    /// Sleep before every response (milliseconds).
    #[arg(long, default_value_t = 0)]
    response_delay: u64,

    /// Delay before publishing diagnostics (milliseconds).
    #[arg(long, default_value_t = 0)]
    diagnostics_delay: u64,

    /// Never publish diagnostics.
    #[arg(long)]
    no_diagnostics: bool,

    /// Close stdout after n responses (simulate crash).
    #[arg(long)]
    drop_after: Option<u64>,

    /// Hold requests for this method until `$/cancelRequest` (repeatable).
    #[arg(long)]
    hang_on: Vec<String>,

    /// Return `InternalError` for this method (repeatable).
    #[arg(long)]
    fail_on: Vec<String>,

    /// Send workspace/configuration request after initialize.
    #[arg(long)]
    send_configuration_request: bool,
}

/// A JSON-RPC message from the client.
#[derive(Debug, Deserialize)]
struct Request {
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// A JSON-RPC response.
#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl Response {
    const fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    const fn error(id: Value, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code, message }),
        }
    }
}

/// Thread-safe writer handle. Wraps `std::io::Stdout` for production,
/// or a shared `Vec<u8>` for tests.
type Writer = Arc<Mutex<Box<dyn Write + Send>>>;

fn stdout_writer() -> Writer {
    Arc::new(Mutex::new(Box::new(std::io::stdout())))
}

#[derive(Debug, Clone)]
struct Document {
    version: i64,
    text: String,
}

/// Shared state for the mock server.
struct MockServer {
    args: Args,
    documents: HashMap<String, Document>,
    client_capabilities: Value,
    hung: Vec<Value>,
    response_count: u64,
    writer: Writer,
    next_request_id: u64,
}

impl MockServer {
    fn new(args: Args, writer: Writer) -> Self {
        Self {
            args,
            documents: HashMap::new(),
            client_capabilities: Value::Null,
            hung: Vec::new(),
            response_count: 0,
            writer,
            next_request_id: 1,
        }
    }

    /// Run the server, reading from the given reader.
    fn run(&mut self, reader: &mut dyn Read) {
        let mut buffer = Vec::new();
        let mut temp = [0u8; 4096];

        loop {
            match reader.read(&mut temp) {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
            }

            while let Some((message, consumed)) = try_parse_message(&buffer) {
                buffer.drain(..consumed);

                let Ok(request) = serde_json::from_str::<Request>(&message) else {
                    continue;
                };

                if !self.handle_message(request) {
                    return;
                }
            }
        }
    }

    /// Returns false once the client sent `exit`.
    fn handle_message(&mut self, request: Request) -> bool {
        let Some(method) = request.method.clone() else {
            // Responses to our own requests need no handling.
            return true;
        };

        if let Some(id) = request.id {
            self.handle_request(&method, id, &request.params);
            true
        } else {
            self.handle_notification(&method, &request.params)
        }
    }

    fn handle_request(&mut self, method: &str, id: Value, params: &Value) {
        if self.args.hang_on.iter().any(|m| m == method) {
            self.hung.push(id);
            return;
        }

        if self.args.response_delay > 0 {
            std::thread::sleep(Duration::from_millis(self.args.response_delay));
        }

        if self.args.fail_on.iter().any(|m| m == method) {
            self.send_response(&Response::error(
                id,
                -32603,
                format!("mockls: configured to fail on {method}"),
            ));
            return;
        }

        if method == "initialize" {
            self.client_capabilities = params.get("capabilities").cloned().unwrap_or(Value::Null);
        }

        let result = match method {
            "initialize" => Some(json!({ "capabilities": self.capabilities() })),
            "shutdown" => Some(Value::Null),
            "textDocument/completion" => Some(self.handle_completion(params)),
            "textDocument/hover" => Some(self.handle_hover(params)),
            "textDocument/definition" => Some(self.handle_definition(params)),
            "textDocument/references" | "textDocument/documentHighlight" => {
                Some(self.handle_references(method, params))
            }
            "textDocument/rename" => Some(self.handle_rename(params)),
            "textDocument/documentSymbol" => Some(self.handle_document_symbols(params)),
            "workspace/symbol" => Some(self.handle_workspace_symbols(params)),
            "textDocument/codeAction" => Some(self.handle_code_actions(params)),
            "codeAction/resolve" => Some(self.handle_resolve(params)),
            "textDocument/formatting" => Some(self.handle_formatting(params)),
            "workspace/executeCommand" => Some(json!({
                "command": params.get("command").cloned().unwrap_or(Value::Null),
                "arguments": params.get("arguments").cloned().unwrap_or(Value::Null),
            })),
            _ => None,
        };

        let response = match result {
            Some(result) => Response::ok(id, result),
            None => Response::error(id, -32601, format!("mockls: method not found: {method}")),
        };
        self.send_response(&response);

        if method == "initialize" && self.args.send_configuration_request {
            self.send_configuration_request();
        }
    }

    fn handle_notification(&mut self, method: &str, params: &Value) -> bool {
        match method {
            "textDocument/didOpen" => {
                if let Some(td) = params.get("textDocument") {
                    let uri = td.get("uri").and_then(Value::as_str).unwrap_or_default();
                    let document = Document {
                        version: td.get("version").and_then(Value::as_i64).unwrap_or(0),
                        text: td
                            .get("text")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    };
                    self.documents.insert(uri.to_string(), document);
                    self.publish_diagnostics(uri);
                }
            }
            "textDocument/didChange" => {
                if let Some(td) = params.get("textDocument") {
                    let uri = td.get("uri").and_then(Value::as_str).unwrap_or_default();
                    let version = td.get("version").and_then(Value::as_i64).unwrap_or(0);
                    let changes = params
                        .get("contentChanges")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    if let Some(document) = self.documents.get_mut(uri) {
                        for change in &changes {
                            apply_change(&mut document.text, change);
                        }
                        document.version = version;
                    }
                    self.publish_diagnostics(uri);
                }
            }
            "textDocument/didClose" => {
                if let Some(uri) = params
                    .get("textDocument")
                    .and_then(|td| td.get("uri"))
                    .and_then(Value::as_str)
                {
                    self.documents.remove(uri);
                }
            }
            "$/cancelRequest" => {
                if let Some(id) = params.get("id")
                    && let Some(index) = self.hung.iter().position(|hung| hung == id)
                {
                    let id = self.hung.remove(index);
                    self.send_response(&Response::error(
                        id,
                        -32800,
                        "mockls: request cancelled".to_string(),
                    ));
                }
            }
            "exit" => return false,
            _ => {}
        }
        true
    }

    fn capabilities(&self) -> Value {
        if let Some(raw) = &self.args.capabilities
            && let Ok(capabilities) = serde_json::from_str::<Value>(raw)
        {
            return capabilities;
        }

        json!({
            "textDocumentSync": {
                "openClose": true,
                "change": if self.args.no_incremental { 1 } else { 2 }
            },
            "completionProvider": { "triggerCharacters": ["."] },
            "hoverProvider": true,
            "definitionProvider": true,
            "referencesProvider": true,
            "renameProvider": true,
            "documentHighlightProvider": true,
            "documentSymbolProvider": true,
            "workspaceSymbolProvider": true,
            "codeActionProvider": { "resolveProvider": true },
            "documentFormattingProvider": true,
            "executeCommandProvider": { "commands": ["mockls.echo"] }
        })
    }

    /// True when the client's `initialize` capabilities hold a truthy
    /// value at `pointer`.
    fn client_supports(&self, pointer: &str) -> bool {
        !matches!(
            self.client_capabilities.pointer(pointer),
            None | Some(Value::Null | Value::Bool(false))
        )
    }

    fn document<'a>(&'a self, params: &'a Value) -> Option<(&'a str, &'a Document)> {
        let uri = params
            .get("textDocument")
            .and_then(|td| td.get("uri"))
            .and_then(Value::as_str)?;
        self.documents.get(uri).map(|document| (uri, document))
    }

    fn word_at<'a>(&'a self, params: &'a Value) -> Option<(&'a str, &'a Document, String)> {
        let (uri, document) = self.document(params)?;
        let (line, col) = extract_position(params)?;
        let word = extract_word(&document.text, line, col)?;
        Some((uri, document, word))
    }

    fn handle_completion(&self, params: &Value) -> Value {
        let Some((_, document)) = self.document(params) else {
            return Value::Null;
        };
        let mut words: Vec<String> = document
            .text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|word| word.len() > 1)
            .map(str::to_string)
            .collect();
        words.sort();
        words.dedup();

        let items: Vec<Value> = words
            .into_iter()
            .map(|word| json!({ "label": word, "kind": 6, "detail": "mockls word" }))
            .collect();
        json!({ "isIncomplete": false, "items": items })
    }

    fn handle_hover(&self, params: &Value) -> Value {
        let Some((_, _, word)) = self.word_at(params) else {
            return Value::Null;
        };
        json!({
            "contents": {
                "kind": "markdown",
                "value": format!("```\n{word}\n```")
            }
        })
    }

    fn handle_definition(&self, params: &Value) -> Value {
        let Some((uri, document, word)) = self.word_at(params) else {
            return Value::Null;
        };

        let def_patterns = [
            format!("fn {word}"),
            format!("function {word}"),
            format!("let {word}"),
            format!("const {word}"),
        ];

        for (line_idx, line_text) in document.text.lines().enumerate() {
            for pattern in &def_patterns {
                if let Some(col_idx) = line_text.find(pattern.as_str()) {
                    let start = col_idx + pattern.len() - word.len();
                    return location_json(uri, line_idx, start, start + word.len());
                }
            }
        }

        Value::Null
    }

    fn occurrences(text: &str, word: &str) -> Vec<(usize, usize)> {
        let mut found = Vec::new();
        for (line_idx, line_text) in text.lines().enumerate() {
            let mut start = 0;
            while let Some(pos) = line_text[start..].find(word) {
                let col_idx = start + pos;
                found.push((line_idx, col_idx));
                start = col_idx + word.len();
            }
        }
        found
    }

    fn handle_references(&self, method: &str, params: &Value) -> Value {
        let Some((uri, document, word)) = self.word_at(params) else {
            return json!([]);
        };
        let items = Self::occurrences(&document.text, &word)
            .into_iter()
            .map(|(line, col)| {
                if method == "textDocument/documentHighlight" {
                    json!({ "range": range_json(line, col, col + word.len()), "kind": 1 })
                } else {
                    location_json(uri, line, col, col + word.len())
                }
            })
            .collect();
        Value::Array(items)
    }

    fn handle_rename(&self, params: &Value) -> Value {
        let Some((uri, document, word)) = self.word_at(params) else {
            return Value::Null;
        };
        let new_name = params
            .get("newName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let edits: Vec<Value> = Self::occurrences(&document.text, &word)
            .into_iter()
            .map(|(line, col)| {
                json!({ "range": range_json(line, col, col + word.len()), "newText": new_name })
            })
            .collect();
        json!({ "changes": { uri: edits } })
    }

    fn handle_document_symbols(&self, params: &Value) -> Value {
        self.document(params)
            .map_or_else(|| json!([]), |(_, document)| {
                Value::Array(extract_symbols(&document.text))
            })
    }

    fn handle_workspace_symbols(&self, params: &Value) -> Value {
        let query = params.get("query").and_then(Value::as_str).unwrap_or("");

        let mut all_symbols = Vec::new();
        for (uri, document) in &self.documents {
            for symbol in extract_symbols(&document.text) {
                let name = symbol.get("name").and_then(Value::as_str).unwrap_or("");
                if query.is_empty() || name.contains(query) {
                    all_symbols.push(json!({
                        "name": name,
                        "kind": symbol["kind"],
                        "location": { "uri": uri, "range": symbol["range"] }
                    }));
                }
            }
        }

        Value::Array(all_symbols)
    }

    fn handle_code_actions(&self, params: &Value) -> Value {
        let Some((uri, document)) = self.document(params) else {
            return json!([]);
        };
        let first = params["range"]["start"]["line"].as_u64().unwrap_or(0);
        let last = params["range"]["end"]["line"].as_u64().unwrap_or(u64::MAX);

        let literal = self.client_supports("/textDocument/codeAction/codeActionLiteralSupport");
        let lazy = self.client_supports("/textDocument/codeAction/dataSupport")
            && self
                .client_capabilities
                .pointer("/textDocument/codeAction/resolveSupport/properties")
                .and_then(Value::as_array)
                .is_some_and(|properties| properties.iter().any(|p| p == "edit"));

        let actions = todo_positions(&document.text)
            .into_iter()
            .filter(|(line, _)| (first..=last).contains(&(*line as u64)))
            .map(|(line, col)| {
                let data = json!({ "uri": uri, "line": line });
                if !literal {
                    return json!({
                        "title": "Remove TODO",
                        "command": "mockls.removeTodo",
                        "arguments": [data]
                    });
                }
                let mut action = json!({ "title": "Remove TODO", "kind": "quickfix" });
                if let Some(fields) = action.as_object_mut() {
                    if lazy {
                        fields.insert("data".to_string(), data);
                    } else {
                        fields.insert("edit".to_string(), remove_todo_edit(uri, line, col));
                    }
                }
                action
            })
            .collect();
        Value::Array(actions)
    }

    fn handle_resolve(&self, action: &Value) -> Value {
        let mut resolved = action.clone();
        let uri = action["data"]["uri"].as_str().unwrap_or_default();
        let line = action["data"]["line"].as_u64().unwrap_or(0);
        let Some(document) = self.documents.get(uri) else {
            return resolved;
        };
        let edit = todo_positions(&document.text)
            .into_iter()
            .find(|(todo_line, _)| *todo_line as u64 == line)
            .map(|(todo_line, col)| remove_todo_edit(uri, todo_line, col));
        if let (Some(edit), Some(fields)) = (edit, resolved.as_object_mut()) {
            fields.insert("edit".to_string(), edit);
        }
        resolved
    }

    fn handle_formatting(&self, params: &Value) -> Value {
        let Some((_, document)) = self.document(params) else {
            return json!([]);
        };
        let edits = document
            .text
            .lines()
            .enumerate()
            .filter_map(|(line, text)| {
                let trimmed = text.trim_end().len();
                (trimmed < text.len()).then(|| {
                    json!({ "range": range_json(line, trimmed, text.len()), "newText": "" })
                })
            })
            .collect();
        Value::Array(edits)
    }

    fn publish_diagnostics(&self, uri: &str) {
        if self.args.no_diagnostics {
            return;
        }
        let Some(document) = self.documents.get(uri) else {
            return;
        };
        let diagnostics: Vec<Value> = todo_positions(&document.text)
            .into_iter()
            .map(|(line, col)| {
                json!({
                    "range": range_json(line, col, col + 4),
                    "severity": 2,
                    "source": "mockls",
                    "code": "todo",
                    "message": "mockls: unresolved TODO"
                })
            })
            .collect();
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "version": document.version,
                "diagnostics": diagnostics
            }
        });

        let delay = self.args.diagnostics_delay;
        if delay > 0 {
            let writer = self.writer.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(delay));
                send_message(&writer, &notification);
            });
        } else {
            send_message(&self.writer, &notification);
        }
    }

    fn send_configuration_request(&mut self) {
        let req_id = self.next_request_id;
        self.next_request_id += 1;
        send_message(
            &self.writer,
            &json!({
                "jsonrpc": "2.0",
                "id": req_id,
                "method": "workspace/configuration",
                "params": { "items": [{ "section": "mockls" }] }
            }),
        );
    }

    fn send_response(&mut self, response: &Response) {
        let Ok(json) = serde_json::to_string(response) else {
            return;
        };

        write_framed(&self.writer, &json);

        self.response_count += 1;

        if let Some(max) = self.args.drop_after
            && self.response_count >= max
        {
            std::process::exit(1);
        }
    }
}

/// Extract `(line, col)` from a `textDocument/position` params object.
fn extract_position(params: &Value) -> Option<(usize, usize)> {
    let position = params.get("position")?;
    let line = usize::try_from(position.get("line").and_then(Value::as_u64)?).ok()?;
    let col = usize::try_from(position.get("character").and_then(Value::as_u64)?).ok()?;
    Some((line, col))
}

fn range_json(line: usize, start: usize, end: usize) -> Value {
    json!({
        "start": { "line": line, "character": start },
        "end": { "line": line, "character": end }
    })
}

fn remove_todo_edit(uri: &str, line: usize, col: usize) -> Value {
    json!({
        "changes": {
            uri: [{ "range": range_json(line, col, col + 4), "newText": "" }]
        }
    })
}

fn location_json(uri: &str, line: usize, start: usize, end: usize) -> Value {
    json!({ "uri": uri, "range": range_json(line, start, end) })
}

/// Byte offset of an LSP position, clamped to the end of its line.
fn offset_of(text: &str, position: &Value) -> Option<usize> {
    let line = usize::try_from(position.get("line")?.as_u64()?).ok()?;
    let character = usize::try_from(position.get("character")?.as_u64()?).ok()?;

    let mut offset = 0;
    for (index, segment) in text.split_inclusive('\n').enumerate() {
        if index == line {
            let content = segment.trim_end_matches('\n');
            let column = content
                .char_indices()
                .nth(character)
                .map_or(content.len(), |(byte, _)| byte);
            return Some(offset + column);
        }
        offset += segment.len();
    }
    (line == text.split_inclusive('\n').count()).then_some(text.len())
}

/// Apply one `contentChanges` entry to `text`.
fn apply_change(text: &mut String, change: &Value) {
    let new_text = change.get("text").and_then(Value::as_str).unwrap_or_default();
    let Some(range) = change.get("range") else {
        *text = new_text.to_string();
        return;
    };
    let (Some(start), Some(end)) = (offset_of(text, &range["start"]), offset_of(text, &range["end"]))
    else {
        return;
    };
    if start <= end {
        text.replace_range(start..end, new_text);
    }
}

/// `(line, column)` of every `TODO` in `text`.
fn todo_positions(text: &str) -> Vec<(usize, usize)> {
    text.lines()
        .enumerate()
        .filter_map(|(line, content)| content.find("TODO").map(|col| (line, col)))
        .collect()
}

/// Write a Content-Length framed JSON string.
fn write_framed(writer: &Writer, json: &str) {
    let header = format!("Content-Length: {}\r\n\r\n", json.len());
    let Ok(mut w) = writer.lock() else { return };
    let _ = w.write_all(header.as_bytes());
    let _ = w.write_all(json.as_bytes());
    let _ = w.flush();
}

/// Send a JSON-RPC message to the client.
fn send_message(writer: &Writer, value: &Value) {
    let Ok(json) = serde_json::to_string(value) else {
        return;
    };
    write_framed(writer, &json);
}

/// Parse a Content-Length framed message from a buffer.
/// Returns the message string and the number of bytes consumed.
fn try_parse_message(buffer: &[u8]) -> Option<(String, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buffer[..header_end]).ok()?;

    let mut content_length: Option<usize> = None;
    for line in headers.lines() {
        if line.to_ascii_lowercase().starts_with("content-length:") {
            content_length = line
                .split_once(':')
                .and_then(|(_, v)| v.trim().parse().ok());
        }
    }

    let content_length = content_length?;
    let total = header_end + 4 + content_length;

    if buffer.len() < total {
        return None;
    }

    let body = std::str::from_utf8(&buffer[header_end + 4..total]).ok()?;
    Some((body.to_string(), total))
}

/// Extract the word at a given line and column from content.
fn extract_word(content: &str, line: usize, col: usize) -> Option<String> {
    let line_text = content.lines().nth(line)?;

    if col >= line_text.len() {
        return None;
    }

    let bytes = line_text.as_bytes();

    let start = (0..=col)
        .rev()
        .find(|&i| !is_word_char(bytes[i]))
        .map_or(0, |i| i + 1);

    let end = (col..bytes.len())
        .find(|&i| !is_word_char(bytes[i]))
        .unwrap_or(bytes.len());

    if start >= end {
        return None;
    }

    Some(line_text[start..end].to_string())
}

const fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Extract symbol definitions from content.
fn extract_symbols(content: &str) -> Vec<Value> {
    let mut symbols = Vec::new();

    for (line_idx, line_text) in content.lines().enumerate() {
        let trimmed = line_text.trim_start();
        let (kind_num, prefix_len) = if trimmed.starts_with("fn ") {
            (12, 3)
        } else if trimmed.starts_with("function ") {
            (12, 9)
        } else if trimmed.starts_with("let ") {
            (13, 4)
        } else if trimmed.starts_with("const ") {
            (14, 6)
        } else {
            continue;
        };

        let name: String = trimmed[prefix_len..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();

        if name.is_empty() {
            continue;
        }

        let indent = line_text.len() - trimmed.len();
        let col_start = indent + prefix_len;

        symbols.push(json!({
            "name": name,
            "kind": kind_num,
            "range": range_json(line_idx, indent, line_text.len()),
            "selectionRange": range_json(line_idx, col_start, col_start + name.len())
        }));
    }

    symbols
}

fn main() {
    let args = Args::parse();
    let mut server = MockServer::new(args, stdout_writer());
    let mut stdin = std::io::stdin().lock();
    server.run(&mut stdin);
}
