use std::io::{self, IsTerminal};
use std::path::PathBuf;

use crate::catalog::MemoryCatalog;
use crate::config::Config;
use crate::RequestedColorMode;

pub(crate) mod health;
pub(crate) mod list;
pub(crate) mod search;
pub(crate) mod sync;
pub(crate) mod watch;

/// Where the catalog snapshot lives when the config does not say.
pub(crate) fn snapshot_path(config: &Config) -> PathBuf {
    if let Some(path) = &config.catalog.snapshot_path {
        return path.clone();
    }

    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".local/share/modelwatch/catalog.json"),
        None => PathBuf::from("modelwatch-catalog.json"),
    }
}

/// Loads the snapshot, or starts empty when none exists yet. A corrupt
/// snapshot is fatal rather than silently discarded.
pub(crate) fn load_catalog(config: &Config) -> MemoryCatalog {
    let path = snapshot_path(config);

    if !path.exists() {
        return MemoryCatalog::new();
    }

    match MemoryCatalog::load_snapshot(&path) {
        Ok(catalog) => catalog,
        Err(err) => crate::fatal!("failed to load catalog snapshot {}: {}", path.display(), err),
    }
}

#[derive(Clone, Copy, strum_macros::Display)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl ColorMode {
    /// Returns whether ANSI color should be used.
    /// If the user has specified a preference, this is honored. This
    /// preference can be specified through the command line or the
    /// "NO_COLOR" environment variable. If the user hasn't stated a
    /// preference, color is enabled if the output is a terminal.
    pub(crate) fn resolve_auto(cm: RequestedColorMode) -> ColorMode {
        match cm {
            RequestedColorMode::Auto => {
                let disable_color =
                    std::env::var_os("NO_COLOR").is_some() || !io::stdout().is_terminal();

                if disable_color {
                    ColorMode::Off
                } else {
                    ColorMode::On
                }
            }
            RequestedColorMode::On => ColorMode::On,
            RequestedColorMode::Off => ColorMode::Off,
        }
    }
}
