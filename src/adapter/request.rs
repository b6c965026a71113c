// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Cancelable, staleness-aware feature requests.
//!
//! Only the latest request per [`FeatureKind`] may surface a result. A
//! cancelled token asks the transport to cancel server-side but never
//! aborts the awaited call; the result is simply not trusted.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::capabilities::FeatureKind;
use super::session::{ActiveSession, SessionSlot};
use crate::error::AdapterError;
use crate::transport::{RequestMeta, Transport};

/// Monotonic serial per feature key.
#[derive(Debug, Default)]
pub struct SerialTable {
    serials: Mutex<HashMap<FeatureKind, u64>>,
}

impl SerialTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<FeatureKind, u64>> {
        self.serials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates the next serial for `key`, making it the authoritative one.
    pub fn allocate(&self, key: FeatureKind) -> u64 {
        let mut serials = self.lock();
        let serial = serials.entry(key).or_insert(0);
        *serial += 1;
        *serial
    }

    /// Returns true unless `serial` is the latest allocated for `key`.
    pub fn is_stale(&self, key: FeatureKind, serial: u64) -> bool {
        self.lock().get(&key) != Some(&serial)
    }

    /// Forgets every key. Outstanding serials become stale.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Issues feature requests through the transport.
pub struct RequestLifecycle {
    slot: Arc<SessionSlot>,
    transport: Arc<dyn Transport>,
    serials: SerialTable,
    sequence: AtomicU64,
}

impl RequestLifecycle {
    pub(crate) fn new(slot: Arc<SessionSlot>, transport: Arc<dyn Transport>) -> Self {
        Self {
            slot,
            transport,
            serials: SerialTable::default(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Builds the meta for a new request. The sequence number never
    /// resets, so ids stay unique for the adapter's lifetime.
    fn next_meta(&self, key: FeatureKind) -> RequestMeta {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        RequestMeta {
            client_request_id: format!(
                "{}:{}:{}",
                key.as_str(),
                chrono::Utc::now().timestamp_millis(),
                sequence
            ),
            timeout: key.request_timeout(),
        }
    }

    async fn cancel(&self, session: &ActiveSession, client_request_id: &str) {
        trace!("Cancelling request {}", client_request_id);
        if let Err(e) = self
            .transport
            .cancel_request(&session.id, client_request_id)
            .await
        {
            trace!("Cancel for {} ignored: {:#}", client_request_id, e);
        }
    }

    /// Runs `request_fn` under the current session.
    ///
    /// Resolves with `fallback` when there is no session, when `token` is
    /// cancelled, when the session changed while waiting, or when a newer
    /// request for `key` was issued. Errors from stale or cancelled
    /// requests are absorbed the same way.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::FeatureQuery`] if the authoritative request
    /// fails.
    pub async fn run_cancelable<T, F, Fut>(
        &self,
        key: FeatureKind,
        token: &CancellationToken,
        fallback: T,
        request_fn: F,
    ) -> Result<T, AdapterError>
    where
        F: FnOnce(Arc<ActiveSession>, RequestMeta) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let Some(session) = self.slot.current() else {
            return Ok(fallback);
        };

        let serial = self.serials.allocate(key);
        let meta = self.next_meta(key);

        if token.is_cancelled() {
            self.cancel(&session, &meta.client_request_id).await;
            return Ok(fallback);
        }

        let request = request_fn(session.clone(), meta.clone());
        tokio::pin!(request);

        let mut cancel_sent = false;
        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut request => break outcome,
                () = token.cancelled(), if !cancel_sent => {
                    cancel_sent = true;
                    self.cancel(&session, &meta.client_request_id).await;
                }
            }
        };

        let discard = cancel_sent
            || token.is_cancelled()
            || !self.slot.is_current(&session)
            || self.serials.is_stale(key, serial);

        match outcome {
            Ok(value) if !discard => Ok(value),
            Ok(_) => {
                trace!("Discarding result of {}", meta.client_request_id);
                Ok(fallback)
            }
            Err(e) if discard => {
                trace!("Absorbing error of {}: {:#}", meta.client_request_id, e);
                Ok(fallback)
            }
            Err(e) => Err(AdapterError::FeatureQuery {
                feature: key.as_str(),
                message: format!("{e:#}"),
            }),
        }
    }

    /// Clears all serials.
    pub fn reset(&self) {
        self.serials.clear();
    }
}
