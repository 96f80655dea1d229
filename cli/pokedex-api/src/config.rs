//! Configuration types for client construction.

use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Configuration for [crate::PokedexClient] construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Pokédex API.
    pub api_url: String,
    /// Additional headers to include in requests.
    pub extra_headers: BTreeMap<String, String>,
    /// Overrides the default `pokedex-api/<version>` user agent.
    pub user_agent: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            extra_headers: BTreeMap::new(),
            user_agent: None,
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(60),
        }
    }
}
