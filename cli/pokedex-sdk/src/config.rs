use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as HierarchicalConfig, Environment, File, FileFormat};
use pokedex_api::token::CLIENT_STATE_FILENAME;
use pokedex_api::{ClientConfig, DEFAULT_API_URL};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of pokedex managed directories (config, data)
const POKEDEX_DIR_NAME: &str = "pokedex";
const POKEDEX_CONFIG_DIR_VAR: &str = "POKEDEX_CONFIG_DIR";
const POKEDEX_ENV_PREFIX: &str = "POKEDEX";
pub const POKEDEX_CONFIG_FILE: &str = "pokedex.toml";

pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page the backend will serve.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Describes the configuration of the pokedex SDK
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the Pokédex API
    pub api_url: String,
    /// Number of entries requested per list page
    pub page_size: u32,
    /// Quiet period after the last search input before the list is refetched
    pub search_debounce_ms: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Directory where the session token is persisted (default:
    /// `$XDG_DATA_HOME/pokedex`)
    pub data_dir: PathBuf,
    /// Directory the configuration file is loaded from (default:
    /// `$XDG_CONFIG_HOME/pokedex`)
    pub config_dir: PathBuf,
    /// Overrides the user agent sent with every request
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the user {0} directory")]
    MissingBaseDirectory(&'static str),
    #[error("could not load configuration")]
    Load(#[from] config::ConfigError),
    #[error("page_size must be between 1 and {MAX_PAGE_SIZE}, got {0}")]
    InvalidPageSize(u32),
}

impl Config {
    /// Creates a [Config] from defaults, config files and the environment
    ///
    /// Later sources take precedence:
    /// 1. built-in defaults
    /// 2. `/etc/pokedex/pokedex.toml`
    /// 3. `$XDG_CONFIG_HOME/pokedex/pokedex.toml`
    /// 4. `$POKEDEX_CONFIG_DIR/pokedex.toml`
    /// 5. `POKEDEX_*` environment variables, e.g. `POKEDEX_API_URL`
    pub fn parse() -> Result<Config, ConfigError> {
        let config: Config = read_raw_config()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.clone(),
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..Default::default()
        }
    }

    /// Location of the file holding the persisted session token.
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(CLIENT_STATE_FILENAME)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

fn read_raw_config() -> Result<HierarchicalConfig, ConfigError> {
    let data_dir = dirs::data_dir()
        .ok_or(ConfigError::MissingBaseDirectory("data"))?
        .join(POKEDEX_DIR_NAME);
    let user_config_dir = dirs::config_dir().map(|dir| dir.join(POKEDEX_DIR_NAME));

    let config_dir = match env::var(POKEDEX_CONFIG_DIR_VAR) {
        Ok(v) => {
            debug!("`${POKEDEX_CONFIG_DIR_VAR}` set: {v}");
            PathBuf::from(v)
        },
        Err(_) => {
            let config_dir = user_config_dir
                .clone()
                .ok_or(ConfigError::MissingBaseDirectory("config"))?;
            debug!("`${POKEDEX_CONFIG_DIR_VAR}` not set, using {config_dir:?}");
            config_dir
        },
    };

    let mut builder = HierarchicalConfig::builder()
        .set_default("api_url", DEFAULT_API_URL)?
        .set_default("page_size", i64::from(DEFAULT_PAGE_SIZE))?
        .set_default("search_debounce_ms", DEFAULT_SEARCH_DEBOUNCE_MS as i64)?
        .set_default("connect_timeout_secs", DEFAULT_CONNECT_TIMEOUT_SECS as i64)?
        .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
        .set_default("data_dir", data_dir.to_string_lossy().into_owned())?
        // Config dir is added to the config for completeness;
        // the config file cannot change the config dir.
        .set_override("config_dir", config_dir.to_string_lossy().into_owned())?;

    // read from /etc
    builder = builder.add_source(toml_file(
        &PathBuf::from("/etc")
            .join(POKEDEX_DIR_NAME)
            .join(POKEDEX_CONFIG_FILE),
    ));

    // the user's file, unless it is the explicit one added below
    if let Some(user_config_dir) = user_config_dir.filter(|dir| *dir != config_dir) {
        builder = builder.add_source(toml_file(&user_config_dir.join(POKEDEX_CONFIG_FILE)));
    }

    // Add explicit POKEDEX_CONFIG_DIR file last
    builder = builder.add_source(toml_file(&config_dir.join(POKEDEX_CONFIG_FILE)));

    // override via env variables
    builder = builder.add_source(Environment::with_prefix(POKEDEX_ENV_PREFIX).try_parsing(true));

    Ok(builder.build()?)
}

fn toml_file(path: &Path) -> impl config::Source + Send + Sync + 'static {
    File::from(path)
        .format(FileFormat::Toml)
        .required(false)
}
