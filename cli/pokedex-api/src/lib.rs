//! HTTP client for the Pokédex API.
//!
//! This crate provides:
//! - [PokedexClient], the adapter that attaches the stored session token to
//!   requests and turns every failure response into a displayable error
//! - [MockClient], serving canned responses to test code built on [ClientTrait]
//! - [token], persistence of the session token shared with the auth store
//! - [types], the wire types exchanged with the backend
//!
//! ## Usage
//!
//! ```ignore
//! use pokedex_api::{ClientConfig, ClientTrait, PokedexClient, token::TokenStore};
//!
//! let tokens = Arc::new(TokenStore::file(data_dir.join("client_state.json")));
//! let client = PokedexClient::new(ClientConfig::default(), tokens)?;
//! let page = client.list_pokemon(&request).await?;
//! ```

mod client;
mod config;
mod error;
mod mock;
pub mod token;
pub mod types;

pub use client::{Client, ClientTrait, PokedexClient};
pub use config::{ClientConfig, DEFAULT_API_URL};
pub use error::{ApiError, AuthError, ClientError, FetchError, GENERIC_ERROR_MESSAGE};
pub use mock::{GenericResponse, MockClient, Request as MockRequest, Response as MockResponse};
