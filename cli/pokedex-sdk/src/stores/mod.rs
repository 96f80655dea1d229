//! Observable state shared between a view layer and the API.
//!
//! Each store keeps its state in a [tokio::sync::watch] channel.
//! State is only ever modified between awaits,
//! subscribers see every transition including loading flags.

pub mod auth;
pub mod catalog;
