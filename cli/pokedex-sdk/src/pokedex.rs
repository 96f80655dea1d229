//! The application context tying configuration, client and stores together.
//!
//! A [Pokedex] is built once at startup and shared by reference. It gates the
//! catalog on the session: nothing is fetched until the user is authenticated,
//! and logging out resets the catalog along with the session.

use std::sync::Arc;

use pokedex_api::token::TokenStore;
use pokedex_api::types::LoginCredentials;
use pokedex_api::{AuthError, Client, ClientError, PokedexClient};
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::stores::auth::AuthStore;
use crate::stores::catalog::{CatalogStore, DetailOutcome};
use crate::utils::debounce::SearchDebouncer;

#[derive(Debug, Error)]
pub enum PokedexError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not create Pokédex API client")]
    Client(#[from] ClientError),
}

/// The context a front end operates on
///
/// A [Pokedex] owns the client, the persisted token and both stores.
/// The stores share the client; the auth store writes the token which the
/// client reads for every authenticated request.
#[derive(Debug)]
pub struct Pokedex {
    config: Config,
    tokens: Arc<TokenStore>,
    client: Arc<Client>,
    auth: AuthStore,
    catalog: Arc<CatalogStore>,
    search: SearchDebouncer,
}

impl Pokedex {
    /// Create a context talking to the configured API,
    /// persisting the token in the configured data directory.
    pub fn new(config: Config) -> Result<Self, PokedexError> {
        let tokens = Arc::new(TokenStore::file(config.token_path()));
        let client = PokedexClient::new(config.client_config(), tokens.clone())?;
        Ok(Self::with_client(config, Client::Pokedex(client), tokens))
    }

    /// Create a context from [Config::parse].
    pub fn from_env() -> Result<Self, PokedexError> {
        Self::new(Config::parse()?)
    }

    pub fn with_client(config: Config, client: Client, tokens: Arc<TokenStore>) -> Self {
        let client = Arc::new(client);
        let auth = AuthStore::new(client.clone(), tokens.clone());
        let catalog = Arc::new(CatalogStore::new(client.clone(), config.page_size));
        let search = SearchDebouncer::new(catalog.clone(), config.search_debounce());

        Self {
            config,
            tokens,
            client,
            auth,
            catalog,
            search,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn search(&self) -> &SearchDebouncer {
        &self.search
    }

    /// Restore a persisted session and load the first page if it is valid.
    ///
    /// Returns whether the user is authenticated.
    pub async fn start(&self) -> bool {
        let authenticated = self.auth.check_auth().await;
        if authenticated {
            self.catalog.fetch_list(true).await;
        } else {
            debug!("not authenticated, not loading the catalog");
        }
        authenticated
    }

    /// Log in and load the first page.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), AuthError> {
        self.auth.login(credentials).await?;
        self.catalog.fetch_list(true).await;
        Ok(())
    }

    /// Load a detail record, if a user is logged in.
    pub async fn open_details(&self, name_or_id: &str) -> Option<DetailOutcome> {
        if !self.auth.state().is_authenticated() {
            debug!(name_or_id, "not authenticated, not loading details");
            return None;
        }
        Some(self.catalog.fetch_details(name_or_id).await)
    }

    /// End the session and forget everything loaded with it.
    pub fn logout(&self) {
        self.auth.logout();
        self.catalog.reset();
    }
}
