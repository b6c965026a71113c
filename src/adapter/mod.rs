// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Capability record and feature resolution.
pub mod capabilities;
/// Session controller.
pub mod controller;
/// Protocol results shaped for the editor.
pub mod convert;
/// Diagnostics filtering and marker projection.
pub mod diagnostics;
/// Editor-facing feature providers.
pub mod features;
/// Cancelable, staleness-aware requests.
pub mod request;
/// Session data model.
pub mod session;
/// Connection status reporting.
pub mod status;
/// Ordered document synchronisation.
pub mod sync;

pub use capabilities::{
    Capabilities, FeatureKind, FeatureSupport, SyncKind, is_advertised, resolve_feature_support,
    resolve_sync_kind,
};
pub use controller::{LspAdapter, StartOutcome};
pub use diagnostics::{DiagnosticsProjector, MARKER_OWNER};
pub use features::{FeatureProviders, register_features};
pub use request::{RequestLifecycle, SerialTable};
pub use session::{ActiveSession, SessionInfo, SessionSlot};
pub use status::{AdapterStatus, StatusReporter};
pub use sync::DocumentSynchronizer;
