//! Client side state management for the Pokédex.
//!
//! [Pokedex] wires the API client, the persisted session token and the
//! [stores] together, configured from [config::Config].

pub mod config;
pub mod pokedex;
pub mod stores;
pub mod utils;

pub use pokedex::{Pokedex, PokedexError};
pub use pokedex_api as api;
