// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Bridle binds an editor's buffer model to a Language Server Protocol
//! session.
//!
//! The adapter keeps document sync strictly ordered, discards results that
//! were superseded by newer requests or sessions, and projects pushed
//! diagnostics onto editor markers. Everything it needs from the outside
//! world goes through two traits: [`transport::Transport`] and
//! [`editor::EditorHost`] / [`editor::BufferModel`].

/// Session controller, sync, request lifecycle and diagnostics.
pub mod adapter;
/// Configuration loading and adapter options.
pub mod config;
/// Registration handles.
pub mod disposable;
/// Editor-side contract and a headless editor.
pub mod editor;
/// Error taxonomy.
pub mod error;
/// Transport contract and implementations.
pub mod transport;
