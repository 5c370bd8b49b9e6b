//! Reporter configuration.
//!
//! Settings come from, in increasing priority:
//! 1. built-in defaults (every sink disabled)
//! 2. an optional TOML file
//! 3. environment variables prefixed with `COMPLEXITY_`
//!
//! | Key            | Environment                 | Effect                                 |
//! |----------------|-----------------------------|----------------------------------------|
//! | `filename`     | `COMPLEXITY_FILENAME`       | per-cell report file                   |
//! | `ctu_filename` | `COMPLEXITY_CTU_FILENAME`   | per-group report file                  |
//! | `dump_xy`      | `COMPLEXITY_DUMP_XY`        | prefix report lines with `col,row`     |
//! | `heatmap_dir`  | `COMPLEXITY_HEATMAP_DIR`    | directory for per-picture PNG heatmaps |
//! | `log_level`    | `COMPLEXITY_LOG_LEVEL`      | default tracing filter                 |
//!
//! A missing key simply leaves the corresponding sink off.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read by [`ComplexityConfig::load`].
pub const ENV_PREFIX: &str = "COMPLEXITY_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityConfig {
    /// Per-cell report output.
    #[serde(default)]
    pub filename: Option<PathBuf>,
    /// Per-group report output.
    #[serde(default)]
    pub ctu_filename: Option<PathBuf>,
    /// Annotate report lines with cell coordinates.
    #[serde(default)]
    pub dump_xy: bool,
    /// Directory receiving one heatmap PNG per picture.
    #[serde(default)]
    pub heatmap_dir: Option<PathBuf>,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            filename: None,
            ctu_filename: None,
            dump_xy: false,
            heatmap_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl ComplexityConfig {
    /// The layered provider behind [`load`](Self::load).
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Loads defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(file).extract()
    }

    /// True when at least one report sink is configured.
    pub fn any_sink_enabled(&self) -> bool {
        self.filename.is_some() || self.ctu_filename.is_some() || self.heatmap_dir.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_disable_every_sink() {
        Jail::expect_with(|_jail| {
            let config = ComplexityConfig::load(None)?;
            assert_eq!(config, ComplexityConfig::default());
            assert!(!config.any_sink_enabled());
            Ok(())
        });
    }

    #[test]
    fn environment_enables_sinks() {
        Jail::expect_with(|jail| {
            jail.set_env("COMPLEXITY_FILENAME", "cells.txt");
            jail.set_env("COMPLEXITY_CTU_FILENAME", "ctus.txt");
            jail.set_env("COMPLEXITY_DUMP_XY", "true");

            let config = ComplexityConfig::load(None)?;
            assert_eq!(config.filename, Some(PathBuf::from("cells.txt")));
            assert_eq!(config.ctu_filename, Some(PathBuf::from("ctus.txt")));
            assert!(config.dump_xy);
            assert_eq!(config.heatmap_dir, None);
            assert!(config.any_sink_enabled());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "complexity.toml",
                r#"
                filename = "from_file.txt"
                heatmap_dir = "maps"
                log_level = "debug"
                "#,
            )?;
            jail.set_env("COMPLEXITY_FILENAME", "from_env.txt");

            let config = ComplexityConfig::load(Some(Path::new("complexity.toml")))?;
            assert_eq!(config.filename, Some(PathBuf::from("from_env.txt")));
            assert_eq!(config.heatmap_dir, Some(PathBuf::from("maps")));
            assert_eq!(config.log_level, "debug");
            assert!(!config.dump_xy);
            Ok(())
        });
    }
}
