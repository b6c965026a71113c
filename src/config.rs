// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Adapter configuration.
//!
//! [`AdapterConfig`] is what lives on disk and in the environment.
//! [`AdapterOptions`] is the in-memory options object handed to
//! [`crate::adapter::LspAdapter`], carrying the loaded values plus the
//! status callback.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::AdapterStatus;

/// Callback invoked on every status transition, with an optional detail.
pub type StatusCallback = Arc<dyn Fn(AdapterStatus, Option<&str>) + Send + Sync>;

/// Adapter settings merged from defaults, files and the environment.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdapterConfig {
    /// Language identifier sent with `didOpen` (default: "plaintext")
    #[serde(default = "default_language_id")]
    pub language_id: String,

    /// Workspace root URI. Falls back to the current directory.
    #[serde(default)]
    pub root_uri: Option<String>,

    /// Negotiate incremental document sync when the server offers it
    #[serde(default = "default_true")]
    pub protocol_v2_enabled: bool,

    /// Register newer features (rename, inlay hints, semantic tokens, ...)
    #[serde(default = "default_true")]
    pub extended_features_enabled: bool,

    /// Server launch definitions keyed by language ID
    #[serde(default)]
    pub server: HashMap<String, ServerConfig>,
}

/// How to launch a language server over stdio.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// The command to execute (e.g., "typescript-language-server")
    pub command: String,

    /// Arguments to pass to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Initialization options forwarded in the `initialize` request
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,
}

fn default_language_id() -> String {
    "plaintext".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            language_id: default_language_id(),
            root_uri: None,
            protocol_v2_enabled: true,
            extended_features_enabled: true,
            server: HashMap::new(),
        }
    }
}

impl AdapterConfig {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read or the
    /// merged result does not deserialize.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("language_id", default_language_id())?
            .set_default("protocol_v2_enabled", true)?
            .set_default("extended_features_enabled", true)?;

        // ~/.config/bridle/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("bridle").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // BRIDLE_PROTOCOL_V2_ENABLED=false, BRIDLE_LANGUAGE_ID=rust, ...
        builder = builder.add_source(config::Environment::with_prefix("BRIDLE"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

/// The options object consumed by the adapter.
#[derive(Clone)]
pub struct AdapterOptions {
    /// Language identifier of the bound document.
    pub language_id: String,
    /// Workspace root URI; `None` means the current directory.
    pub root_uri: Option<String>,
    /// Enables incremental sync negotiation.
    pub protocol_v2_enabled: bool,
    /// Enables the extended feature set.
    pub extended_features_enabled: bool,
    /// Per-start override of the server launch definition.
    pub launch: Option<ServerConfig>,
    /// Status observer.
    pub on_status_change: Option<StatusCallback>,
}

impl AdapterOptions {
    /// Creates options with defaults for the given language.
    pub fn new(language_id: impl Into<String>) -> Self {
        Self {
            language_id: language_id.into(),
            root_uri: None,
            protocol_v2_enabled: true,
            extended_features_enabled: true,
            launch: None,
            on_status_change: None,
        }
    }

    /// Builds options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self {
            language_id: config.language_id.clone(),
            root_uri: config.root_uri.clone(),
            protocol_v2_enabled: config.protocol_v2_enabled,
            extended_features_enabled: config.extended_features_enabled,
            launch: None,
            on_status_change: None,
        }
    }

    /// Sets the workspace root URI.
    #[must_use]
    pub fn with_root_uri(mut self, root_uri: impl Into<String>) -> Self {
        self.root_uri = Some(root_uri.into());
        self
    }

    /// Enables or disables incremental sync negotiation.
    #[must_use]
    pub const fn with_protocol_v2(mut self, enabled: bool) -> Self {
        self.protocol_v2_enabled = enabled;
        self
    }

    /// Enables or disables the extended feature set.
    #[must_use]
    pub const fn with_extended_features(mut self, enabled: bool) -> Self {
        self.extended_features_enabled = enabled;
        self
    }

    /// Overrides the server launch definition for this adapter.
    #[must_use]
    pub fn with_launch(mut self, launch: ServerConfig) -> Self {
        self.launch = Some(launch);
        self
    }

    /// Installs a status observer.
    #[must_use]
    pub fn with_status_observer(
        mut self,
        callback: impl Fn(AdapterStatus, Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        self.on_status_change = Some(Arc::new(callback));
        self
    }

    /// Returns the configured root URI, or the current directory as a
    /// `file://` URL.
    #[must_use]
    pub fn resolved_root_uri(&self) -> Option<String> {
        if let Some(root) = &self.root_uri {
            return Some(root.clone());
        }
        let cwd = std::env::current_dir().ok()?;
        url::Url::from_directory_path(cwd)
            .ok()
            .map(|url| url.to_string())
    }
}

impl fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("language_id", &self.language_id)
            .field("root_uri", &self.root_uri)
            .field("protocol_v2_enabled", &self.protocol_v2_enabled)
            .field("extended_features_enabled", &self.extended_features_enabled)
            .field("launch", &self.launch)
            .field("on_status_change", &self.on_status_change.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn explicit_file_overrides_defaults() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".toml")?;
        writeln!(
            file,
            r#"
language_id = "rust"
protocol_v2_enabled = false

[server.rust]
command = "rust-analyzer"
"#
        )?;

        let config = AdapterConfig::load(Some(file.path().to_path_buf()))?;
        assert_eq!(config.language_id, "rust");
        assert!(!config.protocol_v2_enabled);
        assert!(config.extended_features_enabled);

        let server = config.server.get("rust").context("missing rust server")?;
        assert_eq!(server.command, "rust-analyzer");
        assert!(server.args.is_empty());
        Ok(())
    }

    #[test]
    fn options_from_config_carry_flags() {
        let config = AdapterConfig {
            language_id: "go".to_string(),
            root_uri: Some("file:///srv/app/".to_string()),
            protocol_v2_enabled: false,
            extended_features_enabled: false,
            server: HashMap::new(),
        };

        let options = AdapterOptions::from_config(&config);
        assert_eq!(options.language_id, "go");
        assert!(!options.protocol_v2_enabled);
        assert!(!options.extended_features_enabled);
        assert_eq!(
            options.resolved_root_uri().as_deref(),
            Some("file:///srv/app/")
        );
    }

    #[test]
    fn root_uri_defaults_to_current_directory() {
        let options = AdapterOptions::new("plaintext");
        let root = options.resolved_root_uri();
        assert!(root.is_some_and(|r| r.starts_with("file://")));
    }
}
