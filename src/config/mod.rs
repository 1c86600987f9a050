pub mod merge;
pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Load configuration by merging explicit, local, and global sources.
/// Precedence: CLI overrides > explicit --config file > ./crewflow.toml >
/// global config > defaults.
///
/// Missing implicit config files are handled gracefully (defaults apply);
/// an explicitly passed --config path that cannot be read is a hard error.
pub fn load_config(
    explicit_path: Option<&Path>,
    cli_overrides: PartialConfig,
) -> Result<OrchestratorConfig, ConfigError> {
    let explicit = match explicit_path {
        Some(path) => Some(load_required(path)?),
        None => None,
    };

    let local = load_optional(Path::new("crewflow.toml"));
    let global = global_config_path()
        .and_then(|p| load_optional(&p))
        .unwrap_or_default();

    let config = cli_overrides
        .with_fallback(explicit.unwrap_or_default())
        .with_fallback(local.unwrap_or_default())
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load a config file the caller asked for by path. Unreadable or malformed
/// content is an error, not a fallback.
fn load_required(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(file.to_partial())
}

/// Load and parse a TOML config file, degrading gracefully on any problem.
fn load_optional(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
            Ok(file) => {
                tracing::info!("Loaded config from {}", path.display());
                Some(file.to_partial())
            }
            Err(e) => {
                tracing::warn!("Config parse error in {}: {e}", path.display());
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {e}", path.display());
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/crewflow/crewflow.toml
/// macOS: ~/Library/Application Support/crewflow/crewflow.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "crewflow")
        .map(|dirs| dirs.config_dir().join("crewflow.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crewflow.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[orchestrator]\nworker_ceiling = 7\n\n[estimates]\nbase_minutes_full_crew = 20"
        )
        .unwrap();

        let config = load_config(Some(&path), PartialConfig::default()).unwrap();
        assert_eq!(config.worker_ceiling, 7);
        assert_eq!(config.base_minutes_full_crew, 20);
        // Untouched fields keep defaults.
        assert_eq!(config.sequential_pause_ms, 50);
    }

    #[test]
    fn cli_overrides_beat_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crewflow.toml");
        std::fs::write(&path, "[demo]\nsimulated_latency_ms = 500\n").unwrap();

        let overrides = PartialConfig {
            simulated_latency_ms: Some(5),
            ..Default::default()
        };
        let config = load_config(Some(&path), overrides).unwrap();
        assert_eq!(config.simulated_latency_ms, 5);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let result = load_config(
            Some(Path::new("/definitely/not/here.toml")),
            PartialConfig::default(),
        );
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn malformed_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not [valid toml").unwrap();

        let result = load_config(Some(&path), PartialConfig::default());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
