// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use anyhow::{Result, anyhow};
use lsp_types::Uri;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::trace;

use super::{
    BufferChange, BufferChangeEvent, BufferModel, ChangeListener, EditorHost, EditorPosition,
    EditorRange, Marker,
};
use crate::adapter::{FeatureKind, FeatureProviders};
use crate::disposable::Disposable;

struct ProviderEntry {
    id: u64,
    kind: FeatureKind,
    provider: Arc<FeatureProviders>,
}

type Registry<T> = Arc<Mutex<Vec<(u64, T)>>>;

/// A single-document editor that keeps everything in memory.
///
/// Implements both [`BufferModel`] and [`EditorHost`], which is enough to
/// drive an adapter without a UI: the CLI uses it to check files, and
/// tests use it to observe registrations and markers.
pub struct MemoryEditor {
    uri: Uri,
    text: Mutex<String>,
    next_id: AtomicU64,
    listeners: Registry<ChangeListener>,
    providers: Arc<Mutex<Vec<ProviderEntry>>>,
    registration_log: Mutex<Vec<FeatureKind>>,
    commands: Registry<(String, Arc<FeatureProviders>)>,
    markers: Mutex<HashMap<(String, String), Vec<Marker>>>,
    marker_writes: watch::Sender<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryEditor {
    /// Creates an editor holding `text` under `uri`.
    pub fn new(uri: Uri, text: impl Into<String>) -> Self {
        let (marker_writes, _) = watch::channel(0);
        Self {
            uri,
            text: Mutex::new(text.into()),
            next_id: AtomicU64::new(1),
            listeners: Arc::new(Mutex::new(Vec::new())),
            providers: Arc::new(Mutex::new(Vec::new())),
            registration_log: Mutex::new(Vec::new()),
            commands: Arc::new(Mutex::new(Vec::new())),
            markers: Mutex::new(HashMap::new()),
            marker_writes,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Replaces `range` with `text` and notifies change listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the range does not lie inside the buffer.
    pub fn apply_edit(&self, range: EditorRange, text: &str) -> Result<()> {
        let change = {
            let mut buffer = lock(&self.text);
            let start = byte_offset(&buffer, range.start())
                .ok_or_else(|| anyhow!("Range start {:?} is outside the buffer", range.start()))?;
            let end = byte_offset(&buffer, range.end())
                .ok_or_else(|| anyhow!("Range end {:?} is outside the buffer", range.end()))?;
            if end < start {
                return Err(anyhow!("Range end precedes start: {range:?}"));
            }

            let removed: usize = buffer[start..end].chars().map(char::len_utf16).sum();
            buffer.replace_range(start..end, text);

            BufferChange {
                range,
                range_length: u32::try_from(removed)?,
                text: text.to_string(),
            }
        };

        let event = BufferChangeEvent {
            changes: vec![change],
        };

        // Snapshot so listeners may (un)subscribe while being notified.
        let listeners: Vec<ChangeListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
        Ok(())
    }

    /// Inserts `text` at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the position does not lie inside the buffer.
    pub fn insert(&self, position: EditorPosition, text: &str) -> Result<()> {
        let range = EditorRange::new(
            position.line_number,
            position.column,
            position.line_number,
            position.column,
        );
        self.apply_edit(range, text)
    }

    /// Returns the first live provider registered for `kind`.
    #[must_use]
    pub fn provider(&self, kind: FeatureKind) -> Option<Arc<FeatureProviders>> {
        lock(&self.providers)
            .iter()
            .find(|entry| entry.kind == kind)
            .map(|entry| entry.provider.clone())
    }

    /// Every `register_provider` call ever made, in order.
    #[must_use]
    pub fn registered_kinds(&self) -> Vec<FeatureKind> {
        lock(&self.registration_log).clone()
    }

    /// Number of providers not yet disposed.
    #[must_use]
    pub fn active_provider_count(&self) -> usize {
        lock(&self.providers).len()
    }

    /// Number of change listeners not yet disposed.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Identifiers of registered commands.
    #[must_use]
    pub fn command_ids(&self) -> Vec<String> {
        lock(&self.commands)
            .iter()
            .map(|(_, (command_id, _))| command_id.clone())
            .collect()
    }

    /// Returns the provider behind a registered command.
    #[must_use]
    pub fn command(&self, command_id: &str) -> Option<Arc<FeatureProviders>> {
        lock(&self.commands)
            .iter()
            .find(|(_, (id, _))| id == command_id)
            .map(|(_, (_, provider))| provider.clone())
    }

    /// Current markers for `uri` under `owner`.
    #[must_use]
    pub fn markers(&self, uri: &Uri, owner: &str) -> Vec<Marker> {
        lock(&self.markers)
            .get(&(uri.as_str().to_string(), owner.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Watch channel counting marker replacements.
    #[must_use]
    pub fn marker_updates(&self) -> watch::Receiver<u64> {
        self.marker_writes.subscribe()
    }

    /// Number of marker replacements so far.
    #[must_use]
    pub fn marker_write_count(&self) -> u64 {
        *self.marker_writes.borrow()
    }
}

impl BufferModel for MemoryEditor {
    fn uri(&self) -> Uri {
        self.uri.clone()
    }

    fn text(&self) -> String {
        lock(&self.text).clone()
    }

    fn on_did_change(&self, listener: ChangeListener) -> Disposable {
        let id = self.next_id();
        lock(&self.listeners).push((id, listener));

        let listeners = self.listeners.clone();
        Disposable::new(move || {
            lock(&listeners).retain(|(entry, _)| *entry != id);
        })
    }
}

impl EditorHost for MemoryEditor {
    fn register_provider(
        &self,
        language_id: &str,
        kind: FeatureKind,
        provider: Arc<FeatureProviders>,
    ) -> Disposable {
        trace!("Registering {} provider for {}", kind.as_str(), language_id);
        let id = self.next_id();
        lock(&self.providers).push(ProviderEntry { id, kind, provider });
        lock(&self.registration_log).push(kind);

        let providers = self.providers.clone();
        Disposable::new(move || {
            lock(&providers).retain(|entry| entry.id != id);
        })
    }

    fn register_command(&self, command_id: &str, provider: Arc<FeatureProviders>) -> Disposable {
        let id = self.next_id();
        lock(&self.commands).push((id, (command_id.to_string(), provider)));

        let commands = self.commands.clone();
        Disposable::new(move || {
            lock(&commands).retain(|(entry, _)| *entry != id);
        })
    }

    fn set_markers(&self, uri: &Uri, owner: &str, markers: Vec<Marker>) {
        lock(&self.markers).insert((uri.as_str().to_string(), owner.to_string()), markers);
        self.marker_writes.send_modify(|count| *count += 1);
    }
}

/// Byte offset of a 1-based position whose column counts UTF-16 units.
fn byte_offset(text: &str, position: EditorPosition) -> Option<usize> {
    let mut line_start = 0;
    for _ in 1..position.line_number {
        line_start += text[line_start..].find('\n')? + 1;
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |idx| line_start + idx);

    let target = usize::try_from(position.column.saturating_sub(1)).ok()?;
    let mut units = 0;
    for (idx, ch) in text[line_start..line_end].char_indices() {
        if units >= target {
            return Some(line_start + idx);
        }
        units += ch.len_utf16();
    }
    (units >= target).then_some(line_end)
}
