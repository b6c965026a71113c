// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::config::StatusCallback;

/// Connection status reported to the status observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterStatus {
    /// `start()` passed its preconditions and is talking to the transport.
    Starting,
    /// A session is live and providers are registered.
    Connected,
    /// Language features are unavailable; plain editing continues.
    Fallback,
}

impl AdapterStatus {
    /// Lowercase name, as shown to users.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Connected => "connected",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forwards status transitions to the optional observer.
#[derive(Clone, Default)]
pub struct StatusReporter {
    callback: Option<StatusCallback>,
}

impl StatusReporter {
    /// Wraps an optional observer.
    #[must_use]
    pub const fn new(callback: Option<StatusCallback>) -> Self {
        Self { callback }
    }

    /// Reports a transition.
    pub fn report(&self, status: AdapterStatus, detail: Option<&str>) {
        debug!("Adapter status: {} {}", status, detail.unwrap_or(""));
        if let Some(callback) = &self.callback {
            callback(status, detail);
        }
    }
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
