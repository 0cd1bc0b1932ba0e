//! Runtime configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `STRUTTURA_*` environment variables.
//!
//! | Key                    | Default          | Description                          |
//! |------------------------|------------------|--------------------------------------|
//! | `store_dir`            | `constructions`  | JSON store directory                 |
//! | `default_language`     | `en`             | Language for titles/descriptions     |
//! | `sync_retry_delay_ms`  | `500`            | Pause before the batch-publish retry |
//! | `log_filter`           | `struttura=info` | Default tracing filter directive     |

use crate::text::FALLBACK_LANGUAGE;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "STRUTTURA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrutturaConfig {
    /// Directory holding one `<id>.json` per construction.
    pub store_dir: PathBuf,
    /// Preferred language when resolving localized text.
    pub default_language: String,
    /// Pause before the single batch-publish retry, in milliseconds.
    pub sync_retry_delay_ms: u64,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for StrutturaConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("constructions"),
            default_language: FALLBACK_LANGUAGE.to_string(),
            sync_retry_delay_ms: 500,
            log_filter: "struttura=info".to_string(),
        }
    }
}

impl StrutturaConfig {
    /// Defaults overlaid with `file` (if given, must exist) and the
    /// environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn sync_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sync_retry_delay_ms)
    }
}
