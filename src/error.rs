// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Error taxonomy for the adapter.
//!
//! Each variant's `Display` text is the reason string reported alongside a
//! `fallback` status, so the wording is user-facing.

use thiserror::Error;

/// Failures the adapter surfaces through status reporting or to callers.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The native transport is not present in this environment.
    #[error("LSP transport is unavailable in this environment")]
    EnvironmentUnavailable,

    /// The editor buffer model was not supplied.
    #[error("Editor buffer model is not available")]
    ModelUnavailable,

    /// The transport rejected `start_session` or a later startup step.
    #[error("{0}")]
    SessionStartup(String),

    /// A queued document sync call failed.
    #[error("Document sync failed: {0}")]
    DocumentSync(String),

    /// A feature query failed and was not attributable to staleness.
    #[error("[{feature}] {message}")]
    FeatureQuery {
        /// The feature key of the failed query.
        feature: &'static str,
        /// The transport's error message.
        message: String,
    },

    /// A teardown step failed. Only logged; teardown never propagates it.
    #[error("Teardown step '{step}' failed: {message}")]
    Teardown {
        /// The teardown step that failed.
        step: &'static str,
        /// The transport's error message.
        message: String,
    },
}

impl AdapterError {
    /// Wraps a startup failure, keeping the full context chain.
    #[must_use]
    pub fn startup(error: &anyhow::Error) -> Self {
        Self::SessionStartup(format!("{error:#}"))
    }
}
