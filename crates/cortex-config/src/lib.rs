// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Cortex engine.
//!
//! Layers compiled defaults, `cortex.toml` files from the XDG hierarchy and
//! `CORTEX_*` environment variables, rejects unknown keys, and renders errors
//! as miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use cortex_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("recall limit: {}", config.memory.recall_limit);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{CortexConfig, ExtractionMode, ProviderSettings};

use std::path::{Path, PathBuf};

/// Load configuration from the XDG hierarchy and validate it.
///
/// Deserialization failures are converted into diagnostics carrying source
/// spans for whichever `cortex.toml` file introduced the bad key.
pub fn load_and_validate() -> Result<CortexConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load a specific config file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<CortexConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path.to_path_buf()).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<CortexConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<CortexConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<CortexConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Contents of every config file that exists, keyed by display path.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join("cortex.toml"))
        .unwrap_or_else(|_| PathBuf::from("cortex.toml"));
    let user = dirs::config_dir().map(|d| d.join("cortex/cortex.toml"));
    let system = PathBuf::from("/etc/cortex/cortex.toml");

    [Some(local), user, Some(system)]
        .into_iter()
        .flatten()
        .filter_map(read_source)
        .collect()
}

fn read_source(path: PathBuf) -> Option<(String, String)> {
    let content = std::fs::read_to_string(&path).ok()?;
    Some((path.display().to_string(), content))
}
