// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Registration handles released exactly once.

use std::fmt;

/// A handle to something registered with an editor or transport.
///
/// Calling [`Disposable::dispose`] runs the release hook. Dropping an
/// undisposed handle releases it as well, so a registration can never
/// outlive its owner.
pub struct Disposable {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposable {
    /// Creates a handle that runs `release` when disposed.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Releases the registration.
    pub fn dispose(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("pending", &self.release.is_some())
            .finish()
    }
}
