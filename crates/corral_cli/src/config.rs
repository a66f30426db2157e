//! Sandbox configuration from a JSON file and command-line overrides.

use color_eyre::eyre::{Result, WrapErr};
use corral_sandbox::SandboxConfig;
use std::fs;
use std::path::Path;

/// Build the sandbox config
///
/// Starts from defaults, applies the file at `path` if given, then lets
/// `--memory` override the arena size.
pub fn load(path: Option<&Path>, memory: Option<i64>) -> Result<SandboxConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<SandboxConfig>(&text)
                .wrap_err_with(|| format!("failed to parse config {}", path.display()))?
        }
        None => SandboxConfig::default(),
    };

    if let Some(bytes) = memory {
        config = config.with_arena_bytes(bytes);
    }
    config.validate()?;

    tracing::debug!(
        arena_bytes = config.arena_bytes,
        result_capacity = config.result_capacity,
        error_capacity = config.error_capacity,
        "config loaded"
    );
    Ok(config)
}
