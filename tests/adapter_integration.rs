// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Adapter scenarios against the scripted transport and the headless
//! editor: session lifecycle, sync ordering, staleness, cancellation and
//! diagnostics projection.

use anyhow::{Context, Result};
use bridle::adapter::{
    AdapterStatus, FeatureKind, FeatureSupport, LspAdapter, MARKER_OWNER, SyncKind,
};
use bridle::config::AdapterOptions;
use bridle::editor::{EditorPosition, MarkerSeverity, MemoryEditor, parse_uri};
use bridle::transport::{DiagnosticsBatch, ScriptedTransport};
use lsp_types::Uri;
use rstest::rstest;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DOC: &str = "file:///workspace/src/main.ts";

type StatusLog = Arc<Mutex<Vec<(AdapterStatus, Option<String>)>>>;

struct Harness {
    transport: Arc<ScriptedTransport>,
    editor: Arc<MemoryEditor>,
    adapter: LspAdapter,
    statuses: StatusLog,
    uri: Uri,
}

impl Harness {
    fn new(options: AdapterOptions) -> Result<Self> {
        Self::with_transport(options, Arc::new(ScriptedTransport::new()))
    }

    fn with_transport(options: AdapterOptions, transport: Arc<ScriptedTransport>) -> Result<Self> {
        let uri = parse_uri(DOC)?;
        let editor = Arc::new(MemoryEditor::new(uri.clone(), ""));
        let statuses: StatusLog = Arc::new(Mutex::new(Vec::new()));
        let log = statuses.clone();
        let options = options.with_status_observer(move |status, detail| {
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((status, detail.map(str::to_string)));
        });
        let adapter = LspAdapter::new(
            options,
            transport.clone(),
            editor.clone(),
            Some(editor.clone()),
        );
        Ok(Self {
            transport,
            editor,
            adapter,
            statuses,
            uri,
        })
    }

    fn statuses(&self) -> Vec<(AdapterStatus, Option<String>)> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn session_id(&self) -> Result<String> {
        Ok(self.adapter.session().context("no live session")?.session_id)
    }

    fn type_text(&self, text: &str) -> Result<()> {
        let column = u32::try_from(self.editor_text().len())? + 1;
        self.editor.insert(EditorPosition::new(1, column), text)
    }

    fn editor_text(&self) -> String {
        use bridle::editor::BufferModel;
        self.editor.text()
    }

    fn change_versions(&self) -> Vec<Value> {
        self.transport
            .calls_to("changeDocument")
            .iter()
            .map(|call| call.params["document"]["version"].clone())
            .collect()
    }

    fn batch(&self, version: Option<i32>, message: &str) -> Result<DiagnosticsBatch> {
        Ok(serde_json::from_value(json!({
            "sessionId": self.session_id()?,
            "uri": DOC,
            "version": version,
            "diagnostics": [{
                "range": {
                    "start": { "line": 0, "character": 0 },
                    "end": { "line": 0, "character": 3 }
                },
                "message": message
            }]
        }))?)
    }
}

fn options() -> AdapterOptions {
    AdapterOptions::new("typescript").with_root_uri("file:///workspace/")
}

fn full_capabilities() -> Value {
    json!({
        "textDocumentSync": { "openClose": true, "change": 2 },
        "completionProvider": {},
        "hoverProvider": true,
        "definitionProvider": true,
        "renameProvider": { "prepareProvider": true },
        "inlayHintProvider": true
    })
}

#[tokio::test]
async fn edits_are_versioned_and_sent_in_order() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(full_capabilities());
    assert!(h.adapter.start().await.connected);

    for text in ["a", "b", "c", "d", "e"] {
        h.type_text(text)?;
    }
    h.adapter.flush_sync().await;

    assert_eq!(h.adapter.document_version(), 1 + 5);
    assert_eq!(
        h.change_versions(),
        [json!(2), json!(3), json!(4), json!(5), json!(6)]
    );
    let last = h
        .transport
        .calls_to("changeDocument")
        .pop()
        .context("no sync call")?;
    assert_eq!(last.params["contentChanges"][0]["text"], "e");
    assert_eq!(last.params["fullText"], "abcde");
    Ok(())
}

#[rstest]
#[case::incremental_server_v2_off(2, false)]
#[case::full_server_v2_on(1, true)]
#[tokio::test]
async fn full_sync_sends_no_content_changes(
    #[case] server_sync: u8,
    #[case] protocol_v2: bool,
) -> Result<()> {
    let h = Harness::new(options().with_protocol_v2(protocol_v2))?;
    h.transport
        .set_capabilities(json!({ "textDocumentSync": server_sync }));
    h.adapter.start().await;

    h.type_text("let x = 1;")?;
    h.type_text("\n")?;
    h.adapter.flush_sync().await;

    let calls = h.transport.calls_to("changeDocument");
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.params["contentChanges"].is_null()));
    assert_eq!(calls[1].params["fullText"], "let x = 1;\n");
    Ok(())
}

#[tokio::test]
async fn missing_sync_descriptor_means_full_sync() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(json!({ "hoverProvider": true }));
    h.adapter.start().await;

    h.type_text("x")?;
    h.adapter.flush_sync().await;

    let info = h.adapter.session().context("no session")?;
    assert_eq!(info.sync_kind, SyncKind::Full);
    assert!(h.transport.calls_to("changeDocument")[0].params["contentChanges"].is_null());
    Ok(())
}

#[tokio::test]
async fn delayed_sync_call_blocks_the_next_one() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(full_capabilities());
    h.adapter.start().await;
    let held = h.transport.defer("changeDocument");

    h.type_text("a")?;
    h.type_text("b")?;
    h.type_text("c")?;

    h.transport.wait_for("changeDocument", 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.change_versions(), [json!(2)]);

    held.resolve(Value::Null);
    h.adapter.flush_sync().await;
    assert_eq!(h.change_versions(), [json!(2), json!(3), json!(4)]);
    Ok(())
}

#[tokio::test]
async fn sync_failure_reports_fallback_but_keeps_queue() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    h.transport.fail_once("changeDocument", "pipe closed");

    h.type_text("a")?;
    h.type_text("b")?;
    h.adapter.flush_sync().await;

    assert_eq!(h.transport.calls_to("changeDocument").len(), 2);
    let statuses = h.statuses();
    let (status, detail) = statuses.last().context("no status")?;
    assert_eq!(*status, AdapterStatus::Fallback);
    assert_eq!(
        detail.as_deref(),
        Some("Document sync failed: pipe closed")
    );
    assert!(h.adapter.session().is_some());
    Ok(())
}

#[tokio::test]
async fn diagnostics_apply_only_to_current_or_newer_versions() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    h.type_text("a")?;
    h.type_text("b")?;
    h.adapter.flush_sync().await;
    assert_eq!(h.adapter.document_version(), 3);

    h.transport.emit_diagnostics(&h.batch(Some(2), "stale")?);
    assert!(h.editor.markers(&h.uri, MARKER_OWNER).is_empty());

    h.transport.emit_diagnostics(&h.batch(Some(3), "current")?);
    let markers = h.editor.markers(&h.uri, MARKER_OWNER);
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].message, "current");
    assert_eq!(markers[0].severity, MarkerSeverity::Error);

    h.transport.emit_diagnostics(&h.batch(None, "unversioned")?);
    assert_eq!(h.editor.markers(&h.uri, MARKER_OWNER)[0].message, "unversioned");
    Ok(())
}

#[tokio::test]
async fn diagnostics_for_other_documents_or_sessions_are_ignored() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    let writes_before = h.editor.marker_write_count();

    let mut other_session = h.batch(Some(1), "other session")?;
    other_session.session_id = "someone-else".to_string();
    h.transport.emit_diagnostics(&other_session);

    let mut other_uri = h.batch(Some(1), "other file")?;
    other_uri.uri = parse_uri("file:///workspace/src/other.ts")?;
    h.transport.emit_diagnostics(&other_uri);

    assert_eq!(h.editor.marker_write_count(), writes_before);
    assert!(h.editor.markers(&h.uri, MARKER_OWNER).is_empty());
    Ok(())
}

#[tokio::test]
async fn only_latest_query_result_surfaces() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(full_capabilities());
    h.adapter.start().await;
    let first_reply = h.transport.defer("completion");
    h.transport.reply(
        "completion",
        json!({ "isIncomplete": false, "items": [{ "label": "second" }] }),
    );

    let providers = h.adapter.providers();
    let token = CancellationToken::new();
    let position = EditorPosition::new(1, 1);
    let first = providers.completion(position, None, &token);
    let second = async {
        h.transport.wait_for("completion", 1).await;
        let result = providers.completion(position, None, &token).await;
        first_reply.resolve(json!({ "isIncomplete": false, "items": [{ "label": "first" }] }));
        result
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first?.suggestions.is_empty());
    let labels: Vec<_> = second?.suggestions.into_iter().map(|s| s.label).collect();
    assert_eq!(labels, ["second"]);
    Ok(())
}

#[tokio::test]
async fn superseded_query_error_is_absorbed() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    let first_reply = h.transport.defer("hover");
    h.transport
        .reply("hover", json!({ "contents": "fresh" }));

    let providers = h.adapter.providers();
    let token = CancellationToken::new();
    let position = EditorPosition::new(1, 1);
    let first = providers.hover(position, &token);
    let second = async {
        h.transport.wait_for("hover", 1).await;
        let result = providers.hover(position, &token).await;
        first_reply.reject("server gone");
        result
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first?.is_none());
    assert_eq!(second?.context("no hover")?.contents, ["fresh"]);
    Ok(())
}

#[tokio::test]
async fn cancelled_query_resolves_fallback_and_cancels_once() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    let reply = h.transport.defer("definition");

    let providers = h.adapter.providers();
    let token = CancellationToken::new();
    let query = providers.definition(EditorPosition::new(1, 1), &token);
    let driver = async {
        h.transport.wait_for("definition", 1).await;
        token.cancel();
        token.cancel();
        h.transport.wait_for("cancelRequest", 1).await;
        reply.resolve(json!({
            "uri": DOC,
            "range": {
                "start": { "line": 0, "character": 0 },
                "end": { "line": 0, "character": 1 }
            }
        }));
    };

    let (locations, ()) = tokio::join!(query, driver);
    assert!(locations?.is_empty());

    let cancels = h.transport.calls_to("cancelRequest");
    assert_eq!(cancels.len(), 1);
    let request = h
        .transport
        .calls_to("definition")
        .pop()
        .context("definition not called")?;
    assert_eq!(
        cancels[0].params["clientRequestId"],
        request.params["meta"]["clientRequestId"]
    );
    Ok(())
}

#[tokio::test]
async fn unavailable_environment_reports_one_fallback() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_available(false);

    let outcome = h.adapter.start().await;

    assert!(!outcome.connected);
    assert_eq!(outcome.features, FeatureSupport::default());
    assert!(h.transport.calls().is_empty());
    let statuses = h.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].0, AdapterStatus::Fallback);
    Ok(())
}

#[tokio::test]
async fn missing_model_reports_fallback() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let editor = Arc::new(MemoryEditor::new(parse_uri(DOC)?, ""));
    let adapter = LspAdapter::new(options(), transport.clone(), editor, None);

    assert!(!adapter.start().await.connected);
    assert!(transport.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn startup_failure_surfaces_message_and_allows_retry() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport
        .fail_once("startSession", "spawn typescript-language-server: not found");

    let outcome = h.adapter.start().await;
    assert!(!outcome.connected);
    assert_eq!(h.adapter.capabilities().raw(), &json!({}));
    let statuses = h.statuses();
    assert_eq!(statuses[0].0, AdapterStatus::Starting);
    assert_eq!(statuses[1].0, AdapterStatus::Fallback);
    assert!(
        statuses[1]
            .1
            .as_deref()
            .is_some_and(|detail| detail.contains("not found"))
    );

    assert!(h.adapter.start().await.connected);
    assert_eq!(
        h.statuses().last().map(|(status, _)| *status),
        Some(AdapterStatus::Connected)
    );
    Ok(())
}

#[tokio::test]
async fn completion_only_server_registers_one_provider() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport
        .set_capabilities(json!({ "completionProvider": { "triggerCharacters": ["."] } }));

    let outcome = h.adapter.start().await;

    assert!(outcome.connected);
    assert_eq!(
        outcome.features,
        FeatureSupport {
            completion: true,
            ..FeatureSupport::default()
        }
    );
    assert_eq!(h.editor.registered_kinds(), [FeatureKind::Completion]);
    Ok(())
}

#[tokio::test]
async fn extended_features_can_be_switched_off() -> Result<()> {
    let h = Harness::new(options().with_extended_features(false))?;
    h.transport.set_capabilities(full_capabilities());

    let outcome = h.adapter.start().await;

    assert!(outcome.features.completion);
    assert!(outcome.features.hover);
    assert!(!outcome.features.rename);
    assert!(!outcome.features.inlay_hints);
    assert!(!h.editor.registered_kinds().contains(&FeatureKind::Rename));
    Ok(())
}

#[tokio::test]
async fn dispose_releases_everything_once() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(full_capabilities());
    h.adapter.start().await;
    h.transport.emit_diagnostics(&h.batch(Some(1), "boom")?);
    assert_eq!(h.editor.markers(&h.uri, MARKER_OWNER).len(), 1);
    assert!(h.editor.active_provider_count() > 0);
    assert_eq!(h.transport.listener_count(), 1);

    h.adapter.dispose().await;
    h.adapter.dispose().await;

    assert_eq!(h.editor.active_provider_count(), 0);
    assert!(h.editor.command_ids().is_empty());
    assert_eq!(h.editor.listener_count(), 0);
    assert_eq!(h.transport.listener_count(), 0);
    assert!(h.editor.markers(&h.uri, MARKER_OWNER).is_empty());

    let teardown: Vec<_> = h
        .transport
        .calls()
        .into_iter()
        .map(|call| call.method)
        .filter(|method| method == "closeDocument" || method == "shutdownSession")
        .collect();
    assert_eq!(teardown, ["closeDocument", "shutdownSession"]);
    assert!(h.adapter.session().is_none());
    Ok(())
}

#[tokio::test]
async fn dispose_during_startup_shuts_the_new_session_down() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(full_capabilities());
    let held = h.transport.defer("startSession");

    let (outcome, ()) = tokio::join!(h.adapter.start(), async {
        h.transport.wait_for("startSession", 1).await;
        h.adapter.dispose().await;
        held.resolve(Value::Null);
    });

    assert!(!outcome.connected);
    assert_eq!(h.transport.calls_to("shutdownSession").len(), 1);
    assert!(h.transport.calls_to("openDocument").is_empty());
    assert_eq!(h.editor.active_provider_count(), 0);
    assert!(h.editor.command_ids().is_empty());
    assert_eq!(h.editor.listener_count(), 0);
    assert_eq!(h.transport.listener_count(), 0);
    assert!(h.adapter.session().is_none());

    let statuses = h.statuses();
    let (status, detail) = statuses.last().context("no status")?;
    assert_eq!(*status, AdapterStatus::Fallback);
    assert!(detail.as_deref().is_some_and(|d| d.contains("disposed during startup")));
    Ok(())
}

#[tokio::test]
async fn edits_after_dispose_are_ignored() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    h.adapter.dispose().await;

    h.adapter.on_buffer_changed("late", &[]);
    h.type_text("late")?;
    h.adapter.flush_sync().await;

    assert!(h.transport.calls_to("changeDocument").is_empty());
    Ok(())
}

#[tokio::test]
async fn teardown_failures_are_swallowed() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    h.transport.fail("closeDocument", "broken pipe");
    h.transport.fail("shutdownSession", "broken pipe");

    h.adapter.dispose().await;

    assert_eq!(h.transport.calls_to("shutdownSession").len(), 1);
    assert!(h.adapter.session().is_none());
    Ok(())
}

#[tokio::test]
async fn restart_supersedes_previous_session() -> Result<()> {
    let h = Harness::new(options())?;
    h.transport.set_capabilities(full_capabilities());
    h.adapter.start().await;
    let first = h.session_id()?;

    h.adapter.start().await;
    let second = h.session_id()?;

    assert_ne!(first, second);
    let shutdowns = h.transport.calls_to("shutdownSession");
    assert_eq!(shutdowns.len(), 1);
    assert_eq!(shutdowns[0].session_id.as_deref(), Some(first.as_str()));
    assert_eq!(h.transport.listener_count(), 1);
    assert_eq!(
        h.editor.command_ids(),
        [format!("lsp.{second}.executeCommand")]
    );

    // Diagnostics tagged with the old session no longer apply.
    let mut stale = h.batch(None, "old")?;
    stale.session_id = first;
    h.transport.emit_diagnostics(&stale);
    assert!(h.editor.markers(&h.uri, MARKER_OWNER).is_empty());
    Ok(())
}

#[tokio::test]
async fn start_after_dispose_rearms() -> Result<()> {
    let h = Harness::new(options())?;
    h.adapter.start().await;
    h.adapter.dispose().await;

    assert!(h.adapter.start().await.connected);
    h.type_text("x")?;
    h.adapter.flush_sync().await;
    assert_eq!(h.change_versions(), [json!(2)]);
    Ok(())
}

#[tokio::test]
async fn open_document_carries_buffer_text() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let h = Harness::with_transport(options(), transport)?;
    h.type_text("const a = 1;")?;

    h.adapter.start().await;

    let open = h
        .transport
        .calls_to("openDocument")
        .pop()
        .context("openDocument not called")?;
    assert_eq!(open.params["document"]["text"], "const a = 1;");
    assert_eq!(open.params["document"]["version"], 1);
    assert_eq!(open.params["document"]["languageId"], "typescript");
    let start = h
        .transport
        .calls_to("startSession")
        .pop()
        .context("startSession not called")?;
    assert_eq!(start.params["rootUri"], "file:///workspace/");
    Ok(())
}
